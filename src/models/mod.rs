//! Menu data model
//!
//! The cache stores one `MenuDocument` and replaces it wholesale on every
//! write. Record types mirror the rows of the remote store's collections.

pub mod menu;
pub mod serde_helpers;

pub use menu::{Category, GalleryImage, Product, ProductTag, Restaurant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Resource collections exposed by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Restaurants,
    Categories,
    Products,
    GalleryImages,
    ProductTags,
    AdminUsers,
}

/// The single cached document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuDocument {
    #[serde(default)]
    pub restaurant: Option<Restaurant>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub gallery_images: Vec<GalleryImage>,
    #[serde(default)]
    pub product_tags: Vec<ProductTag>,
}

impl MenuDocument {
    pub fn is_empty(&self) -> bool {
        self.restaurant.is_none()
            && self.categories.is_empty()
            && self.products.is_empty()
            && self.gallery_images.is_empty()
            && self.product_tags.is_empty()
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn gallery_image(&self, id: &str) -> Option<&GalleryImage> {
        self.gallery_images.iter().find(|g| g.id == id)
    }
}

/// A row type that lives in one collection of the document
///
/// Lets the service layer save and delete any record kind with one code path.
pub trait MenuRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn records(doc: &MenuDocument) -> &[Self];

    fn records_mut(doc: &mut MenuDocument) -> &mut Vec<Self>;
}

impl MenuRecord for Category {
    const COLLECTION: Collection = Collection::Categories;

    fn id(&self) -> &str {
        &self.id
    }

    fn records(doc: &MenuDocument) -> &[Self] {
        &doc.categories
    }

    fn records_mut(doc: &mut MenuDocument) -> &mut Vec<Self> {
        &mut doc.categories
    }
}

impl MenuRecord for Product {
    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> &str {
        &self.id
    }

    fn records(doc: &MenuDocument) -> &[Self] {
        &doc.products
    }

    fn records_mut(doc: &mut MenuDocument) -> &mut Vec<Self> {
        &mut doc.products
    }
}

impl MenuRecord for GalleryImage {
    const COLLECTION: Collection = Collection::GalleryImages;

    fn id(&self) -> &str {
        &self.id
    }

    fn records(doc: &MenuDocument) -> &[Self] {
        &doc.gallery_images
    }

    fn records_mut(doc: &mut MenuDocument) -> &mut Vec<Self> {
        &mut doc.gallery_images
    }
}

impl MenuRecord for ProductTag {
    const COLLECTION: Collection = Collection::ProductTags;

    fn id(&self) -> &str {
        &self.id
    }

    fn records(doc: &MenuDocument) -> &[Self] {
        &doc.product_tags
    }

    fn records_mut(doc: &mut MenuDocument) -> &mut Vec<Self> {
        &mut doc.product_tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_collection_names_match_remote_tables() {
        let names: Vec<String> = Collection::iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "restaurants",
                "categories",
                "products",
                "gallery_images",
                "product_tags",
                "admin_users"
            ]
        );
        assert_eq!(
            Collection::from_str("gallery_images").unwrap(),
            Collection::GalleryImages
        );
    }

    #[test]
    fn test_document_uses_camel_case_top_level_keys() {
        let doc = MenuDocument::default();
        let value = serde_json::to_value(&doc).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("galleryImages"));
        assert!(object.contains_key("productTags"));
        assert!(object.contains_key("restaurant"));
        assert!(doc.is_empty());
    }

    #[test]
    fn test_document_tolerates_missing_sections() {
        let doc: MenuDocument =
            serde_json::from_str(r#"{"products":[{"id":"p1","name":"Soup"}]}"#).unwrap();
        assert_eq!(doc.products.len(), 1);
        assert!(doc.categories.is_empty());
        assert!(doc.product("p1").is_some());
        assert!(!doc.is_empty());
    }
}
