//! Deduplicating collection of images touched during a batch.

use std::collections::HashMap;

use super::ImageRecord;

/// Images keyed by id. The first record added for an id wins.
#[derive(Debug, Default)]
pub struct ImageSet {
    items: HashMap<String, ImageRecord>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image; returns false if an image with the same id was present.
    pub fn add(&mut self, image: ImageRecord) -> bool {
        if self.items.contains_key(&image.id) {
            return false;
        }
        self.items.insert(image.id.clone(), image);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_images(self) -> impl Iterator<Item = ImageRecord> {
        self.items.into_values()
    }
}
