use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// URL-friendly identifier derived from a display name: lowercased,
/// runs of non-alphanumeric characters collapsed to single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Classic Haircut"), "classic-haircut");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("Wash & Blow-Dry"), "wash-blow-dry");
    }

    #[test]
    fn test_slugify_trims_trailing() {
        assert_eq!(slugify("Manicure!"), "manicure");
        assert_eq!(slugify("  Facial  "), "facial");
    }
}
