//! Utility functions shared by the framework crates
//!
//! Naming helpers used to derive request property names from Rust field names
//! and human readable field labels from property paths.

/// Naming convention utilities for properties
pub mod naming {
    /// Converts a snake_case Rust identifier into the camelCase property name
    /// used in request parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::utils::naming::snake_to_camel;
    ///
    /// assert_eq!(snake_to_camel("number_one"), "numberOne");
    /// assert_eq!(snake_to_camel("confirm_password"), "confirmPassword");
    /// assert_eq!(snake_to_camel("user"), "user");
    /// ```
    pub fn snake_to_camel(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        let mut upper_next = false;

        for ch in s.trim_start_matches('_').chars() {
            if ch == '_' {
                upper_next = true;
            } else if upper_next {
                result.extend(ch.to_uppercase());
                upper_next = false;
            } else {
                result.push(ch);
            }
        }

        result
    }

    /// Builds a display label from the last segment of a property path.
    ///
    /// Index expressions are dropped and camelCase words are split, so
    /// `user.firstName` becomes `First Name` and `items[2].unitPrice`
    /// becomes `Unit Price`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::utils::naming::humanize;
    ///
    /// assert_eq!(humanize("numberOne"), "Number One");
    /// assert_eq!(humanize("user.username"), "Username");
    /// assert_eq!(humanize("items[2].unitPrice"), "Unit Price");
    /// ```
    pub fn humanize(path: &str) -> String {
        let last = path.rsplit('.').next().unwrap_or(path);
        let last = last.split('[').next().unwrap_or(last);

        let mut result = String::with_capacity(last.len() + 4);
        let mut prev_lower = false;
        for (i, ch) in last.chars().enumerate() {
            if ch == '_' || ch == '-' {
                result.push(' ');
                prev_lower = false;
                continue;
            }
            if i == 0 {
                result.extend(ch.to_uppercase());
            } else if ch.is_uppercase() && prev_lower {
                result.push(' ');
                result.push(ch);
            } else if result.ends_with(' ') {
                result.extend(ch.to_uppercase());
            } else {
                result.push(ch);
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }

        result
    }
}
