use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use validator::Validate;

use crate::{
    constants::GROWTH_RECORDS_KEY,
    entities::growth::{growth_stats, GrowthEntry, GrowthRecord, GrowthStats},
    errors::AppError,
    infrastructure::{
        kv::{read_list, write_json, KeyValueStore},
        utils::ids::generate_id,
    },
};

/// Growth records are kept on the device only.
pub struct GrowthHandler {
    store: Arc<dyn KeyValueStore>,
    writes: Mutex<()>,
}

fn clean(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

impl GrowthHandler {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        GrowthHandler { store, writes: Mutex::new(()) }
    }

    fn load(&self) -> Result<Vec<GrowthRecord>, AppError> {
        Ok(read_list(self.store.as_ref(), GROWTH_RECORDS_KEY)?)
    }

    fn save(&self, records: &[GrowthRecord]) -> Result<(), AppError> {
        Ok(write_json(self.store.as_ref(), GROWTH_RECORDS_KEY, records)?)
    }

    /// Newest date first.
    pub fn list(&self) -> Result<Vec<GrowthRecord>, AppError> {
        let mut records = self.load()?;
        records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.created_at.cmp(&a.created_at)));
        Ok(records)
    }

    pub fn add(&self, entry: GrowthEntry) -> Result<GrowthRecord, AppError> {
        entry.validate()?;

        let now = Utc::now();
        let record = GrowthRecord {
            id: generate_id("growth"),
            date: entry.date,
            height: entry.height,
            weight: entry.weight,
            head_circumference: entry.head_circumference,
            milestone: clean(entry.milestone),
            memo: clean(entry.memo),
            created_at: now,
            updated_at: now,
        };

        let _guard = self.writes.lock();
        let mut records = self.load()?;
        records.push(record.clone());
        self.save(&records)?;
        tracing::info!("Growth record {} added for {}", record.id, record.date);
        Ok(record)
    }

    pub fn update(&self, id: &str, entry: GrowthEntry) -> Result<GrowthRecord, AppError> {
        entry.validate()?;

        let _guard = self.writes.lock();
        let mut records = self.load()?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Growth record {}", id)))?;

        record.date = entry.date;
        record.height = entry.height;
        record.weight = entry.weight;
        record.head_circumference = entry.head_circumference;
        record.milestone = clean(entry.milestone);
        record.memo = clean(entry.memo);
        record.updated_at = Utc::now();

        let updated = record.clone();
        self.save(&records)?;
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<(), AppError> {
        let _guard = self.writes.lock();
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(AppError::NotFound(format!("Growth record {}", id)));
        }
        self.save(&records)
    }

    pub fn stats(&self) -> Result<Option<GrowthStats>, AppError> {
        Ok(growth_stats(&self.load()?))
    }
}
