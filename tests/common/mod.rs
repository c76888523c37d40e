#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use menu_cache::errors::{RemoteError, RemoteResult};
use menu_cache::optimizer::DataUrl;
use menu_cache::remote::{Collection, RemoteStore};

pub const START: i64 = 1_700_000_000_000;

/// PNG of pseudo-random noise; PNG cannot compress it, so the encoded size
/// is close to `width * height * 3`
pub fn noise_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.max(1);
    let image = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn png_data_url(width: u32, height: u32, seed: u32) -> String {
    DataUrl::new("image/png", noise_png(width, height, seed)).encode()
}

/// In-memory stand-in for the REST store
#[derive(Default)]
pub struct FakeRemote {
    rows: Mutex<HashMap<Collection, Vec<Value>>>,
    next_id: AtomicUsize,
    pub fetches: AtomicUsize,
    pub fail_writes: Mutex<bool>,
}

impl FakeRemote {
    pub fn seeded() -> Self {
        let remote = Self::default();
        {
            let mut rows = remote.rows.lock().unwrap();
            rows.insert(
                Collection::Restaurants,
                vec![json!({"id": 1, "name": "Trattoria", "phone": "555-0100"})],
            );
            rows.insert(
                Collection::Categories,
                vec![
                    json!({"id": "mains", "name": "Mains", "display_order": 2}),
                    json!({"id": "starters", "name": "Starters", "display_order": 1}),
                ],
            );
            rows.insert(
                Collection::Products,
                vec![
                    json!({"id": "steak", "name": "Steak", "price": 24.0,
                           "category_id": "mains", "display_order": 1}),
                    json!({"id": "soup", "name": "Soup", "price": 6.5,
                           "category_id": "starters", "display_order": 1, "tags": [1]}),
                ],
            );
            rows.insert(Collection::GalleryImages, Vec::new());
            rows.insert(
                Collection::ProductTags,
                vec![json!({"id": 1, "name": "vegan", "color": "#00aa00"})],
            );
        }
        remote
    }

    pub fn push_row(&self, collection: Collection, row: Value) {
        self.rows
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push(row);
    }

    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check_writable(&self, collection: Collection) -> RemoteResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(RemoteError::Status {
                status: 503,
                collection: collection.to_string(),
                message: "unavailable".into(),
            });
        }
        Ok(())
    }
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_all(&self, collection: Collection) -> RemoteResult<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows(collection))
    }

    async fn insert(&self, collection: Collection, mut row: Value) -> RemoteResult<Value> {
        self.check_writable(collection)?;
        if row_id(&row).is_none() {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
            row["id"] = json!(format!("gen-{id}"));
        }
        self.rows
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> RemoteResult<Value> {
        self.check_writable(collection)?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry(collection)
            .or_default()
            .iter_mut()
            .find(|r| row_id(r).as_deref() == Some(id))
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                collection: collection.to_string(),
                message: format!("{id} not found"),
            })?;
        if let (Value::Object(target), Value::Object(patch)) = (&mut *row, patch) {
            target.extend(patch);
        }
        Ok(row.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
        self.check_writable(collection)?;
        self.rows
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .retain(|r| row_id(r).as_deref() != Some(id));
        Ok(())
    }
}
