use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::FilterCriteria;
use crate::persist::Preferences;
use crate::store::{CatalogStore, FetchTicket, ReplaceOutcome};
use crate::tmdb::CatalogSource;

/// Whether the settings pane sits next to the grid or covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneMode {
    Single,
    Dual,
}

impl FromStr for PaneMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(PaneMode::Single),
            "dual" => Ok(PaneMode::Dual),
            other => Err(format!("unknown pane mode '{other}' (expected single or dual)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pane {
    Grid,
    Settings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    CriteriaChanged(FilterCriteria),
    SettingsClosed { changed: bool },
    /// Cold start.
    Launched,
    /// View recreated over a warm cache.
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub fetch: bool,
    pub refresh: Option<Pane>,
}

impl Decision {
    const NOTHING: Decision = Decision {
        fetch: false,
        refresh: None,
    };

    fn fetch_grid() -> Self {
        Decision {
            fetch: true,
            refresh: Some(Pane::Grid),
        }
    }

    fn refresh(pane: Pane) -> Self {
        Decision {
            fetch: false,
            refresh: Some(pane),
        }
    }
}

/// Pure pane policy. `dirty` is whether criteria changed since the settings pane opened.
pub fn decide(mode: PaneMode, event: &FilterEvent, dirty: bool) -> Decision {
    match (mode, event) {
        (_, FilterEvent::Launched) => Decision::fetch_grid(),
        (_, FilterEvent::Restored) => Decision::refresh(Pane::Grid),
        (PaneMode::Dual, FilterEvent::CriteriaChanged(_)) => Decision::fetch_grid(),
        (PaneMode::Single, FilterEvent::CriteriaChanged(_)) => Decision::refresh(Pane::Settings),
        (PaneMode::Single, FilterEvent::SettingsClosed { changed }) => {
            if *changed || dirty {
                Decision::fetch_grid()
            } else {
                Decision::refresh(Pane::Grid)
            }
        }
        (PaneMode::Dual, FilterEvent::SettingsClosed { .. }) => Decision::NOTHING,
    }
}

/// How a dispatched movie fetch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchReport {
    Replaced(ReplaceOutcome),
    Failed(CatalogError),
}

pub struct Dispatched {
    pub decision: Decision,
    pub ticket: Option<FetchTicket>,
    pub task: Option<JoinHandle<FetchReport>>,
}

impl Dispatched {
    /// Waits for the background fetch, if one was started.
    pub async fn finished(self) -> Option<FetchReport> {
        let task = self.task?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Movie fetch task ended abnormally: {}", e);
                None
            }
        }
    }
}

/// Turns filter events into persisted criteria, movie fetches, and pane refreshes.
pub struct FilterChangeCoordinator {
    source: Arc<dyn CatalogSource>,
    store: Arc<CatalogStore>,
    prefs: Preferences,
    mode: PaneMode,
    dirty: AtomicBool,
    dispatch: Mutex<()>,
}

impl FilterChangeCoordinator {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<CatalogStore>,
        prefs: Preferences,
        mode: PaneMode,
    ) -> Self {
        Self {
            source,
            store,
            prefs,
            mode,
            dirty: AtomicBool::new(false),
            dispatch: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> PaneMode {
        self.mode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn current_criteria(&self) -> CatalogResult<FilterCriteria> {
        self.prefs.load_criteria()
    }

    pub fn on_criteria_changed(&self, criteria: FilterCriteria) -> CatalogResult<Dispatched> {
        self.handle(FilterEvent::CriteriaChanged(criteria))
    }

    /// Must be called from within a tokio runtime; fetches run as spawned tasks.
    pub fn handle(&self, event: FilterEvent) -> CatalogResult<Dispatched> {
        let _guard = self.dispatch.lock().unwrap_or_else(|e| e.into_inner());

        let saved = match &event {
            FilterEvent::CriteriaChanged(criteria) => {
                self.prefs.save_criteria(criteria)?;
                debug!(?criteria, "Criteria persisted");
                Some(criteria.clone())
            }
            _ => None,
        };

        let dirty = match (&event, self.mode) {
            (FilterEvent::CriteriaChanged(_), PaneMode::Single) => {
                self.dirty.store(true, Ordering::SeqCst);
                true
            }
            (FilterEvent::SettingsClosed { .. }, _) => self.dirty.swap(false, Ordering::SeqCst),
            _ => self.is_dirty(),
        };

        let decision = decide(self.mode, &event, dirty);
        info!(
            mode = ?self.mode,
            fetch = decision.fetch,
            refresh = ?decision.refresh,
            "Filter event handled"
        );

        if !decision.fetch {
            return Ok(Dispatched {
                decision,
                ticket: None,
                task: None,
            });
        }

        // Read back what was persisted so the fetch sees all five fields as stored.
        let criteria = match (self.prefs.load_criteria(), saved) {
            (Ok(criteria), _) => criteria,
            (Err(e), Some(saved)) => {
                warn!("Criteria read-back failed, fetching with the values just saved: {}", e);
                saved
            }
            (Err(e), None) => return Err(e),
        };
        let ticket = self.store.begin_fetch();
        let task = tokio::spawn(run_fetch(
            self.source.clone(),
            self.store.clone(),
            ticket,
            criteria,
        ));
        Ok(Dispatched {
            decision,
            ticket: Some(ticket),
            task: Some(task),
        })
    }

    /// Fetches genres and certifications that are not cached yet, then drops persisted
    /// selections the fresh lists no longer contain. Returns true when criteria were reset.
    pub async fn ensure_reference_lists(&self) -> CatalogResult<bool> {
        if self.store.genre_count() == 0 {
            let fetched = self.source.fetch_genres().await;
            if fetched.is_ok() {
                self.store.set_genres(fetched.items);
            }
        }
        if self.store.certification_count() == 0 {
            let fetched = self.source.fetch_certifications().await;
            if fetched.is_ok() {
                self.store.set_certifications(fetched.items);
            }
        }

        let _guard = self.dispatch.lock().unwrap_or_else(|e| e.into_inner());
        let mut criteria = self.prefs.load_criteria()?;
        if !criteria.reconcile(&self.store.get_genres(), &self.store.get_certifications()) {
            return Ok(false);
        }
        info!(
            genre_id = criteria.genre_id,
            certification = %criteria.certification_name,
            "Reset selections missing from reference lists"
        );
        self.prefs.save_criteria(&criteria)?;
        Ok(true)
    }
}

async fn run_fetch(
    source: Arc<dyn CatalogSource>,
    store: Arc<CatalogStore>,
    ticket: FetchTicket,
    criteria: FilterCriteria,
) -> FetchReport {
    let fetched = source.fetch_movies(&criteria).await;
    match fetched.error {
        None => FetchReport::Replaced(store.replace_movies_tagged(ticket, fetched.items)),
        Some(error) => {
            store.report_fetch_failure(ticket, &error);
            FetchReport::Failed(error)
        }
    }
}
