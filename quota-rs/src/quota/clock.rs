use chrono::{NaiveDate, Utc};
use std::sync::Mutex;

use super::types::Period;

/// Source of the current date
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn period(&self) -> Period {
        Period::from_date(self.today())
    }
}

/// Wall clock, in UTC
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Manually driven clock for simulating month rollover
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        FixedClock {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap_or_else(|e| e.into_inner()) = date;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock().unwrap_or_else(|e| e.into_inner())
    }
}
