//! In-memory ski day store backing the default schema's mutations.
//!
//! `addDay` stores a day and publishes it on `newDay`; `removeDay` deletes one.
//! Queries stay mocked.

use indexmap::IndexMap;
use mockql_runtime::{HandlerMap, Publisher, ResolutionError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The bundled schema.
pub const SCHEMA: &str = include_str!("../assets/skiday.graphql");

/// The bundled mock rules.
pub const MOCKS: &str = include_str!("../assets/skiday-mocks.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkiDay {
    pub id: String,
    pub date: String,
    pub mountain: String,
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddDayInput {
    pub date: String,
    pub mountain: String,
    #[serde(default)]
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveDayPayload {
    pub day: Option<SkiDay>,
    pub remove: bool,
    pub total_before: usize,
    pub total_after: usize,
}

#[derive(Debug)]
pub struct SkiDayStore {
    days: Mutex<IndexMap<String, SkiDay>>,
    next_id: AtomicU64,
    publisher: Publisher,
}

impl SkiDayStore {
    pub fn new(publisher: Publisher) -> Arc<Self> {
        Arc::new(Self {
            days: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            publisher,
        })
    }

    fn days(&self) -> MutexGuard<'_, IndexMap<String, SkiDay>> {
        self.days.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.days().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<SkiDay> {
        self.days().get(id).cloned()
    }

    /// Stores a new day and publishes it to `newDay` subscribers.
    pub fn add_day(&self, input: AddDayInput) -> SkiDay {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let day = SkiDay {
            id: id.clone(),
            date: input.date,
            mountain: input.mountain,
            conditions: input.conditions,
        };
        self.days().insert(id, day.clone());

        match serde_json::to_value(&day) {
            Ok(payload) => {
                if !self.publisher.publish("newDay", payload) {
                    tracing::warn!(day = %day.id, "event stream closed, newDay not published");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to encode newDay event"),
        }
        tracing::debug!(day = %day.id, mountain = %day.mountain, "day added");
        day
    }

    pub fn remove_day(&self, id: &str) -> RemoveDayPayload {
        let mut days = self.days();
        let total_before = days.len();
        let day = days.shift_remove(id);
        RemoveDayPayload {
            remove: day.is_some(),
            day,
            total_before,
            total_after: days.len(),
        }
    }

    /// Handlers for `Mutation.addDay` and `Mutation.removeDay`.
    pub fn handlers(self: &Arc<Self>) -> HandlerMap {
        let mut handlers = HandlerMap::new();

        let store = Arc::clone(self);
        handlers.register_fn("Mutation", "addDay", move |args, _ctx| {
            let input: AddDayInput = args.require("input")?;
            to_value(&store.add_day(input))
        });

        let store = Arc::clone(self);
        handlers.register_fn("Mutation", "removeDay", move |args, _ctx| {
            let id: String = args.require("id")?;
            to_value(&store.remove_day(&id))
        });

        handlers
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, ResolutionError> {
    serde_json::to_value(value).map_err(|error| ResolutionError::Internal(error.to_string()))
}
