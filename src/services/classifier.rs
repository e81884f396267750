//! Transaction type classification
//!
//! Keyword matching over the listing's transaction hint, description and price
//! text, optionally combined with a price-magnitude rule (rentals are priced
//! per month, sales in the hundreds of thousands and up). Pure and
//! deterministic: the same record always gets the same label.

use crate::domain::{ListingRecord, TransactionType};

#[derive(Debug, Clone)]
pub struct ClassifierRules {
    pub sale_keywords: Vec<String>,
    pub rent_keywords: Vec<String>,
    /// Parsed prices below this signal a rental, at or above a sale.
    pub rent_price_ceiling: Option<f64>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect();
        Self {
            sale_keywords: words(&["for sale", "sale", "buy", "purchase", "למכירה", "מכירה"]),
            rent_keywords: words(&[
                "for rent",
                "to let",
                "rent",
                "rental",
                "lease",
                "per month",
                "monthly",
                "month",
                "להשכרה",
                "השכרה",
                "שכירות",
                "לחודש",
            ]),
            rent_price_ceiling: Some(100_000.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    sale_keywords: Vec<String>,
    rent_keywords: Vec<String>,
    rent_price_ceiling: Option<f64>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierRules::default())
    }
}

impl Classifier {
    pub fn new(rules: ClassifierRules) -> Self {
        let prepare = |keywords: Vec<String>| {
            keywords
                .iter()
                .map(|k| normalize_text(k))
                .filter(|k| !k.trim().is_empty())
                .collect()
        };
        Self {
            sale_keywords: prepare(rules.sale_keywords),
            rent_keywords: prepare(rules.rent_keywords),
            rent_price_ceiling: rules.rent_price_ceiling,
        }
    }

    pub fn classify(&self, record: &ListingRecord) -> TransactionType {
        let text = normalize_text(&format!(
            "{} {} {}",
            record.transaction_hint, record.description, record.price
        ));

        let mut sale = self.sale_keywords.iter().any(|k| text.contains(k.as_str()));
        let mut rent = self.rent_keywords.iter().any(|k| text.contains(k.as_str()));

        if let (Some(ceiling), Some(price)) = (self.rent_price_ceiling, record.price_value()) {
            if price > 0.0 && price < ceiling {
                rent = true;
            } else if price >= ceiling {
                sale = true;
            }
        }

        match (sale, rent) {
            (true, false) => TransactionType::ForSale,
            (false, true) => TransactionType::ForRent,
            _ => TransactionType::Unknown,
        }
    }
}

/// Lowercase, turn everything but letters and digits into single spaces, and
/// pad with spaces so that `contains(" rent ")` matches whole words only.
fn normalize_text(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}
