//! Post → product derivation.
//!
//! A post becomes a product when its caption yields a name. Price is
//! optional and normalized to rupees.

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::catalog::Product;
use crate::extractor::{Post, Profile};

/// Words kept from the caption line that names the product.
const NAME_WORDS: usize = 4;

/// Compiled caption patterns.
pub struct ProductRules {
    price: Regex,
    glyphs: Regex,
}

impl ProductRules {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            price: Regex::new(
                r"(?i)(?:₹|\brs\.?|\binr\b|\bprice\b|\bcost\b)\s*:?\s*(\d+(?:,\d+)*(?:\.\d+)?)",
            )?,
            // Emoji, pictographs and their joiners/variation selectors.
            glyphs: Regex::new(r"[\p{Extended_Pictographic}\p{So}\p{Sk}\x{FE0F}\x{200D}]")?,
        })
    }

    /// Name from the first non-empty line with at least two words.
    ///
    /// Returns `None` when that line is nothing but glyphs.
    pub fn extract_product_name(&self, caption: &str) -> Option<String> {
        let line = caption
            .lines()
            .map(str::trim)
            .find(|line| line.split_whitespace().nth(1).is_some())?;

        let head: Vec<&str> = line.split_whitespace().take(NAME_WORDS).collect();
        let joined = head.join(" ");
        let stripped = self.glyphs.replace_all(&joined, "");
        let name = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        (!name.is_empty()).then_some(name)
    }

    /// First currency-marked amount, as `₹<amount>`.
    pub fn extract_price(&self, caption: &str) -> Option<String> {
        self.price
            .captures(caption)
            .and_then(|c| c.get(1))
            .map(|amount| format!("₹{}", amount.as_str()))
    }

    fn product_from_post(&self, post: &Post, user_id: Uuid, catalog_id: Uuid) -> Option<Product> {
        let name = self.extract_product_name(&post.caption)?;
        Some(Product {
            id: Uuid::new_v4(),
            user_id,
            catalog_id,
            name,
            description: post.caption.clone(),
            price: self.extract_price(&post.caption),
            image_url: post.images.first().cloned().unwrap_or_default(),
            post_url: post.post_url.clone(),
            created_at: Utc::now(),
        })
    }

    /// One product per post that yields a name, in post order.
    pub fn derive_products(
        &self,
        profile: &Profile,
        user_id: Uuid,
        catalog_id: Uuid,
    ) -> Vec<Product> {
        profile
            .posts
            .iter()
            .filter_map(|post| self.product_from_post(post, user_id, catalog_id))
            .collect()
    }
}

/// Name reported for a finished catalog.
pub fn business_name(profile: &Profile) -> String {
    profile.business_name().to_string()
}
