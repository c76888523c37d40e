//! Addressing image fields inside the menu document

use serde::{Deserialize, Serialize};
use std::fmt;

use super::data_url::is_base64_image;
use crate::models::MenuDocument;

/// Where an image lives in the document
///
/// Records are addressed by id rather than position so a location stays
/// valid when the document is re-sorted between backup and restore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageLocation {
    Product { id: String },
    RestaurantBanner,
    RestaurantLogo,
    GalleryImage { id: String },
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product { id } => write!(f, "products[{id}].image"),
            Self::RestaurantBanner => f.write_str("restaurant.banner"),
            Self::RestaurantLogo => f.write_str("restaurant.logo"),
            Self::GalleryImage { id } => write!(f, "gallery[{id}].url"),
        }
    }
}

impl ImageLocation {
    /// Current value of the field, if the record exists and the field is set
    pub fn read<'a>(&self, doc: &'a MenuDocument) -> Option<&'a str> {
        match self {
            Self::Product { id } => doc.product(id)?.image.as_deref(),
            Self::RestaurantBanner => doc.restaurant.as_ref()?.banner.as_deref(),
            Self::RestaurantLogo => doc.restaurant.as_ref()?.logo.as_deref(),
            Self::GalleryImage { id } => Some(doc.gallery_image(id)?.url.as_str()),
        }
    }

    /// Replace the field; returns false when the owning record is gone
    pub fn write(&self, doc: &mut MenuDocument, value: String) -> bool {
        match self {
            Self::Product { id } => match doc.products.iter_mut().find(|p| &p.id == id) {
                Some(product) => {
                    product.image = Some(value);
                    true
                }
                None => false,
            },
            Self::RestaurantBanner => match doc.restaurant.as_mut() {
                Some(restaurant) => {
                    restaurant.banner = Some(value);
                    true
                }
                None => false,
            },
            Self::RestaurantLogo => match doc.restaurant.as_mut() {
                Some(restaurant) => {
                    restaurant.logo = Some(value);
                    true
                }
                None => false,
            },
            Self::GalleryImage { id } => match doc.gallery_images.iter_mut().find(|g| &g.id == id)
            {
                Some(image) => {
                    image.url = value;
                    true
                }
                None => false,
            },
        }
    }

    /// Empty the field (gallery urls become `""`, optional fields `None`)
    pub fn clear(&self, doc: &mut MenuDocument) {
        match self {
            Self::Product { id } => {
                if let Some(product) = doc.products.iter_mut().find(|p| &p.id == id) {
                    product.image = None;
                }
            }
            Self::RestaurantBanner => {
                if let Some(restaurant) = doc.restaurant.as_mut() {
                    restaurant.banner = None;
                }
            }
            Self::RestaurantLogo => {
                if let Some(restaurant) = doc.restaurant.as_mut() {
                    restaurant.logo = None;
                }
            }
            Self::GalleryImage { id } => {
                if let Some(image) = doc.gallery_images.iter_mut().find(|g| &g.id == id) {
                    image.url.clear();
                }
            }
        }
    }
}

/// Every base64 image field in scan order: products, banner, logo, gallery
pub fn collect_images(doc: &MenuDocument) -> Vec<(ImageLocation, String)> {
    let mut found = Vec::new();

    for product in &doc.products {
        if let Some(image) = product.image.as_deref().filter(|v| is_base64_image(v)) {
            found.push((
                ImageLocation::Product {
                    id: product.id.clone(),
                },
                image.to_string(),
            ));
        }
    }

    if let Some(restaurant) = &doc.restaurant {
        if let Some(banner) = restaurant.banner.as_deref().filter(|v| is_base64_image(v)) {
            found.push((ImageLocation::RestaurantBanner, banner.to_string()));
        }
        if let Some(logo) = restaurant.logo.as_deref().filter(|v| is_base64_image(v)) {
            found.push((ImageLocation::RestaurantLogo, logo.to_string()));
        }
    }

    for image in &doc.gallery_images {
        if is_base64_image(&image.url) {
            found.push((
                ImageLocation::GalleryImage {
                    id: image.id.clone(),
                },
                image.url.clone(),
            ));
        }
    }

    found
}

/// Copy of the document with every base64 image field emptied
///
/// Returns the stripped document and how many fields were cleared.
pub fn strip_base64_images(doc: &MenuDocument) -> (MenuDocument, usize) {
    let locations = collect_images(doc);
    let mut stripped = doc.clone();
    for (location, _) in &locations {
        location.clear(&mut stripped);
    }
    (stripped, locations.len())
}
