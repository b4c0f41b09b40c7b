//! Allow-listed attribute extraction from user records.

use std::collections::BTreeMap;

use crate::identity::UserRecord;

/// Profile attributes forwarded to downstream consumers, in lookup order.
pub const ALLOWED_ATTRIBUTES: [&str; 5] = ["country", "statePlace", "city", "address", "phone"];

/// Collect the first value of each allow-listed attribute present on `user`.
///
/// Attributes with no values are left out of the map entirely.
pub fn extract_attributes(user: &dyn UserRecord) -> BTreeMap<String, String> {
    ALLOWED_ATTRIBUTES
        .iter()
        .filter_map(|name| {
            user.attribute_values(name)
                .into_iter()
                .next()
                .map(|value| ((*name).to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticUser;

    #[test]
    fn test_first_value_wins() {
        let user = StaticUser::new("u1").with_attribute("country", ["US", "CA"]);

        let attributes = extract_attributes(&user);

        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes.get("country").map(String::as_str), Some("US"));
    }

    #[test]
    fn test_empty_attribute_is_omitted() {
        let user = StaticUser::new("u1")
            .with_attribute("city", Vec::<String>::new())
            .with_attribute("phone", ["+1 555 0100"]);

        let attributes = extract_attributes(&user);

        assert!(!attributes.contains_key("city"));
        assert_eq!(attributes["phone"], "+1 555 0100");
    }

    #[test]
    fn test_unlisted_attributes_never_appear() {
        let user = StaticUser::new("u1")
            .with_attribute("referralCode", ["ABC123"])
            .with_attribute("statePlace", ["Antioquia"])
            .with_attribute("Country", ["XX"]);

        let attributes = extract_attributes(&user);

        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["statePlace"]);
    }

    #[test]
    fn test_all_allowed_attributes() {
        let user = ALLOWED_ATTRIBUTES
            .iter()
            .fold(StaticUser::new("u1"), |user, name| {
                user.with_attribute(*name, [format!("{name}-value")])
            });

        let attributes = extract_attributes(&user);

        assert_eq!(attributes.len(), ALLOWED_ATTRIBUTES.len());
        assert_eq!(attributes["address"], "address-value");
    }

    #[test]
    fn test_user_without_attributes() {
        assert!(extract_attributes(&StaticUser::new("u1")).is_empty());
    }
}
