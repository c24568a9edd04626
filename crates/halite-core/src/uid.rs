//! Generated unique ids for devices and models.
//!
//! Hosts persist device settings by UID, so drivers should configure fixed
//! UIDs. Generated ones only last for the lifetime of the driver.

use uuid::Uuid;

/// A fresh UID of the form `halite-<kind>-<uuid>`.
pub fn generate(kind: &str) -> String {
    format!("halite-{kind}-{}", Uuid::new_v4().hyphenated())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_uids_are_unique() {
        let a = generate("device");
        let b = generate("device");
        assert!(a.starts_with("halite-device-"));
        assert_ne!(a, b);
    }
}
