/// The 50 US states, title-cased.
pub const US_STATES: [&str; 50] = [
    "Alabama", "Alaska", "Arizona", "Arkansas", "California",
    "Colorado", "Connecticut", "Delaware", "Florida", "Georgia",
    "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa",
    "Kansas", "Kentucky", "Louisiana", "Maine", "Maryland",
    "Massachusetts", "Michigan", "Minnesota", "Mississippi", "Missouri",
    "Montana", "Nebraska", "Nevada", "New Hampshire", "New Jersey",
    "New Mexico", "New York", "North Carolina", "North Dakota", "Ohio",
    "Oklahoma", "Oregon", "Pennsylvania", "Rhode Island", "South Carolina",
    "South Dakota", "Tennessee", "Texas", "Utah", "Vermont",
    "Virginia", "Washington", "West Virginia", "Wisconsin", "Wyoming",
];

/// Exact, case-sensitive membership test against [`US_STATES`].
///
/// Callers title-case user input first (see [`title_case`]).
pub fn validate_state_name(state_name: &str) -> bool {
    US_STATES.contains(&state_name)
}

/// Title-case a string: a letter is upper-cased when the previous character
/// is not a letter, lower-cased otherwise ("new york" -> "New York",
/// "NORTH_DAKOTA" -> "North_Dakota").
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_is_letter = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// File-name form of a state name: spaces to underscores, lower case.
pub fn state_slug(state_name: &str) -> String {
    state_name.trim().replace(' ', "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_state_name() {
        assert!(validate_state_name("Texas"));
        assert!(validate_state_name("New Hampshire"));
        assert!(!validate_state_name("Atlantis"));
        // Matching is exact
        assert!(!validate_state_name("texas"));
        assert!(!validate_state_name("TEXAS"));
        assert!(!validate_state_name("New_Hampshire"));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("texas"), "Texas");
        assert_eq!(title_case("new york"), "New York");
        assert_eq!(title_case("NORTH CAROLINA"), "North Carolina");
        assert_eq!(title_case("west_virginia"), "West_Virginia");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_title_cased_input_validates() {
        for state in US_STATES {
            assert!(validate_state_name(&title_case(&state.to_lowercase())));
        }
    }

    #[test]
    fn test_state_slug() {
        assert_eq!(state_slug("Texas"), "texas");
        assert_eq!(state_slug("New Mexico"), "new_mexico");
    }
}
