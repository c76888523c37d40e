//! Filtered, ordered views over the cached document

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{Category, MenuDocument, Product};

/// Order used for anything without an explicit position
pub const UNORDERED: i64 = 999;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub active_only: bool,
    pub category_id: Option<String>,
    /// Case-insensitive substring of name or description
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    pub fn in_category<S: Into<String>>(mut self, category_id: S) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn matching<S: Into<String>>(mut self, search: S) -> Self {
        self.search = Some(search.into());
        self
    }

    fn accepts(&self, product: &Product) -> bool {
        if self.active_only && !product.active {
            return false;
        }
        if let Some(category_id) = &self.category_id
            && product.category_id.as_ref() != Some(category_id)
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => product.matches_search(needle),
            _ => true,
        }
    }
}

/// Categories by display order, then name
pub fn categories(doc: &MenuDocument, active_only: bool) -> Vec<Category> {
    let mut categories: Vec<Category> = doc
        .categories
        .iter()
        .filter(|c| !active_only || c.active)
        .cloned()
        .collect();
    categories.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.name.cmp(&b.name))
    });
    categories
}

/// Products matching `filter` in menu order
///
/// Category position first, then active before inactive, then the product's
/// own position (inactive products sink to the end of their category), then
/// newest first.
pub fn products(doc: &MenuDocument, filter: &ProductFilter) -> Vec<Product> {
    let category_order: HashMap<&str, i64> = doc
        .categories
        .iter()
        .map(|c| (c.id.as_str(), c.display_order))
        .collect();

    let mut products: Vec<Product> = doc
        .products
        .iter()
        .filter(|p| filter.accepts(p))
        .cloned()
        .collect();
    products.sort_by(|a, b| compare_products(a, b, &category_order));
    products
}

fn compare_products(a: &Product, b: &Product, category_order: &HashMap<&str, i64>) -> Ordering {
    let category_rank = |p: &Product| {
        p.category_id
            .as_deref()
            .and_then(|id| category_order.get(id).copied())
            .unwrap_or(UNORDERED)
    };
    let product_rank = |p: &Product| {
        if p.active {
            p.display_order.unwrap_or(UNORDERED)
        } else {
            UNORDERED
        }
    };

    category_rank(a)
        .cmp(&category_rank(b))
        .then_with(|| b.active.cmp(&a.active))
        .then_with(|| product_rank(a).cmp(&product_rank(b)))
        .then_with(|| newest_first(a.created_at, b.created_at))
}

fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
