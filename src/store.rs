//! Process-wide catalog cache.
//!
//! Every list is held as an `Arc<Vec<_>>` behind an `RwLock`; writers build the replacement list
//! first and swap the pointer, so a reader holds either the old list or the new one. Movie
//! replacement, persistence, and the change notification all happen inside one writer critical
//! section, which keeps memory, disk, and subscribers agreeing on which list won.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::models::{Certification, Genre, Movie, ANY_GENRE_ID};
use crate::persist::KeyValueStore;

pub const MOVIES_KEY: &str = "movie_list";

/// Sequence number handed out when a movie fetch is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MovieListStatus {
    /// Nothing to show yet, or a newer fetch is still outstanding.
    Loading,
    /// A list is present; `count == 0` means nothing matched (or the last fetch failed).
    Ready {
        count: usize,
        last_error: Option<String>,
    },
}

/// What subscribers receive after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogView {
    pub revision: u64,
    pub status: MovieListStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    Applied,
    /// The in-memory list was replaced but could not be written to storage.
    AppliedNotPersisted(CatalogError),
    /// A list from a newer fetch is already applied; this one was discarded.
    Stale,
}

impl ReplaceOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, ReplaceOutcome::Stale)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub movies: Arc<Vec<Movie>>,
    pub genres: Arc<Vec<Genre>>,
    pub certifications: Arc<Vec<Certification>>,
}

#[derive(Debug, Default)]
struct WriterState {
    issued: u64,
    /// Newest ticket whose list is in memory; the only input to the stale check.
    applied: u64,
    /// Newest ticket that finished either way; drives `Loading`.
    settled: u64,
    loaded: bool,
    last_error: Option<String>,
    revision: u64,
}

pub struct CatalogStore {
    movies: RwLock<Arc<Vec<Movie>>>,
    genres: RwLock<Arc<Vec<Genre>>>,
    certifications: RwLock<Arc<Vec<Certification>>>,
    writer: Mutex<WriterState>,
    kv: Arc<dyn KeyValueStore>,
    notify: watch::Sender<CatalogView>,
    hydration_error: Option<CatalogError>,
}

impl CatalogStore {
    /// Creates the store and rehydrates the movie list persisted by a previous process.
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        let (movies, loaded, hydration_error) = match load_movies(kv.as_ref()) {
            Ok(Some(movies)) => {
                info!("Rehydrated {} movies from storage", movies.len());
                (movies, true, None)
            }
            Ok(None) => {
                info!("No persisted movie list found");
                (Vec::new(), false, None)
            }
            Err(e) => {
                warn!("Failed to rehydrate movie list: {}", e);
                (Vec::new(), false, Some(e))
            }
        };

        let writer = WriterState {
            loaded,
            ..WriterState::default()
        };
        let (notify, _) = watch::channel(CatalogView {
            revision: 0,
            status: status_of(&writer, movies.len()),
        });

        Self {
            movies: RwLock::new(Arc::new(movies)),
            genres: RwLock::new(Arc::new(Vec::new())),
            certifications: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(writer),
            kv,
            notify,
            hydration_error,
        }
    }

    pub fn hydration_error(&self) -> Option<&CatalogError> {
        self.hydration_error.as_ref()
    }

    pub fn get_movies(&self) -> Arc<Vec<Movie>> {
        read(&self.movies)
    }

    pub fn get_movie(&self, id: i64) -> Option<Movie> {
        self.get_movies().iter().find(|m| m.id == id).cloned()
    }

    pub fn movie_count(&self) -> usize {
        self.get_movies().len()
    }

    pub fn get_genres(&self) -> Arc<Vec<Genre>> {
        read(&self.genres)
    }

    pub fn genre_count(&self) -> usize {
        self.get_genres().len()
    }

    pub fn get_certifications(&self) -> Arc<Vec<Certification>> {
        read(&self.certifications)
    }

    pub fn certification_count(&self) -> usize {
        self.get_certifications().len()
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            movies: self.get_movies(),
            genres: self.get_genres(),
            certifications: self.get_certifications(),
        }
    }

    /// Genre id for `name`, or the "any genre" id when it is unknown.
    pub fn genre_id(&self, name: &str) -> i32 {
        self.get_genres()
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.id)
            .unwrap_or(ANY_GENRE_ID)
    }

    pub fn genre_name(&self, id: i32) -> Option<String> {
        self.get_genres()
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.clone())
    }

    /// Names for the movie's genre ids; ids missing from the cached list are skipped.
    pub fn genre_names_for(&self, movie: &Movie) -> Vec<String> {
        let genres = self.get_genres();
        movie
            .genre_ids
            .iter()
            .filter_map(|id| genres.iter().find(|g| g.id == *id).map(|g| g.name.clone()))
            .collect()
    }

    /// Meant to be called once per process; a repeat call overwrites.
    pub fn set_genres(&self, genres: Vec<Genre>) {
        debug!(count = genres.len(), "Caching genres");
        *write(&self.genres) = Arc::new(genres);
    }

    /// Meant to be called once per process; a repeat call overwrites.
    pub fn set_certifications(&self, certifications: Vec<Certification>) {
        debug!(count = certifications.len(), "Caching certifications");
        *write(&self.certifications) = Arc::new(certifications);
    }

    pub fn status(&self) -> MovieListStatus {
        self.notify.borrow().status.clone()
    }

    pub fn view(&self) -> CatalogView {
        self.notify.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
        self.notify.subscribe()
    }

    /// Reserves the next sequence number for a movie fetch about to start.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut w = self.lock_writer();
        w.issued += 1;
        let ticket = FetchTicket(w.issued);
        self.publish(&mut w);
        ticket
    }

    /// Replaces the movie list unconditionally (a fresh ticket is issued and applied).
    pub fn replace_movies(&self, movies: Vec<Movie>) -> ReplaceOutcome {
        let mut w = self.lock_writer();
        w.issued += 1;
        let ticket = FetchTicket(w.issued);
        self.apply(&mut w, ticket, movies)
    }

    /// Replaces the movie list unless a list from a fetch dispatched after `ticket` is
    /// already applied.
    pub fn replace_movies_tagged(&self, ticket: FetchTicket, movies: Vec<Movie>) -> ReplaceOutcome {
        let mut w = self.lock_writer();
        self.apply(&mut w, ticket, movies)
    }

    /// Records a failed fetch so the status stops reporting `Loading`; the list is kept and
    /// older fetches may still apply theirs.
    pub fn report_fetch_failure(&self, ticket: FetchTicket, error: &CatalogError) -> bool {
        let mut w = self.lock_writer();
        if ticket.0 <= w.settled {
            debug!(seq = ticket.0, "Ignoring failure from superseded fetch");
            return false;
        }
        w.settled = ticket.0;
        w.loaded = true;
        w.last_error = Some(error.to_string());
        self.publish(&mut w);
        true
    }

    fn apply(&self, w: &mut WriterState, ticket: FetchTicket, movies: Vec<Movie>) -> ReplaceOutcome {
        if ticket.0 <= w.applied {
            debug!(
                seq = ticket.0,
                applied = w.applied,
                "Discarding stale movie list"
            );
            return ReplaceOutcome::Stale;
        }

        let snapshot = Arc::new(dedupe_by_id(movies));
        *write(&self.movies) = snapshot.clone();
        w.applied = ticket.0;
        // A newer failure stays visible when an older fetch lands after it.
        if ticket.0 >= w.settled {
            w.settled = ticket.0;
            w.last_error = None;
        }
        w.loaded = true;

        let persisted = save_movies(self.kv.as_ref(), &snapshot);
        self.publish(w);
        info!(seq = ticket.0, count = snapshot.len(), "Movie list replaced");

        match persisted {
            Ok(()) => ReplaceOutcome::Applied,
            Err(e) => {
                warn!("Movie list replaced in memory but not persisted: {}", e);
                ReplaceOutcome::AppliedNotPersisted(e)
            }
        }
    }

    fn publish(&self, w: &mut WriterState) {
        w.revision += 1;
        let view = CatalogView {
            revision: w.revision,
            status: status_of(w, self.movie_count()),
        };
        self.notify.send_replace(view);
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn status_of(w: &WriterState, count: usize) -> MovieListStatus {
    if !w.loaded || w.issued > w.settled {
        MovieListStatus::Loading
    } else {
        MovieListStatus::Ready {
            count,
            last_error: w.last_error.clone(),
        }
    }
}

fn load_movies(kv: &dyn KeyValueStore) -> Result<Option<Vec<Movie>>, CatalogError> {
    let Some(text) = kv.get(MOVIES_KEY)? else {
        return Ok(None);
    };
    let movies: Vec<Movie> = serde_json::from_str(&text)
        .map_err(|e| CatalogError::persistence(format!("corrupt movie snapshot: {e}")))?;
    Ok(Some(dedupe_by_id(movies)))
}

fn save_movies(kv: &dyn KeyValueStore, movies: &[Movie]) -> Result<(), CatalogError> {
    let text = serde_json::to_string(movies).map_err(CatalogError::persistence)?;
    kv.put(MOVIES_KEY, &text)
}

fn dedupe_by_id(movies: Vec<Movie>) -> Vec<Movie> {
    let total = movies.len();
    let mut seen = HashSet::with_capacity(total);
    let unique: Vec<Movie> = movies.into_iter().filter(|m| seen.insert(m.id)).collect();
    if unique.len() != total {
        warn!("Dropped {} duplicate movie ids", total - unique.len());
    }
    unique
}

fn read<T>(lock: &RwLock<Arc<T>>) -> Arc<T> {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write<T>(lock: &RwLock<Arc<T>>) -> std::sync::RwLockWriteGuard<'_, Arc<T>> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
