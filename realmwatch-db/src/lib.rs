mod error;

pub use error::{DbError, Result};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, InterruptHandle, OpenFlags};
use tracing::{debug, info, warn};

/// Table holding one row per character, with a non-zero `online` flag for
/// characters currently in the world.
pub const DEFAULT_CHARACTER_TABLE: &str = "characters";

/// Upper bound for a single population query unless the caller picks another.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Read-only handle to the realm's character database.
///
/// The connection is opened with `SQLITE_OPEN_READ_ONLY`, so the monitor can
/// never modify the characters it counts. It is opened on first use and
/// dropped after any failed query, so an unavailable database only fails
/// the queries made while it is unavailable.
#[derive(Clone)]
pub struct CharacterStore {
  path: Arc<Path>,
  count_sql: Arc<str>,
  query_timeout: Duration,
  live: Arc<Mutex<Option<LiveConnection>>>,
}

#[derive(Clone)]
struct LiveConnection {
  conn: Connection,
  interrupt: Arc<InterruptHandle>,
}

/// Interrupts the statement running on a connection unless disarmed first.
///
/// Dropping a pending `call` future does not stop the closure on the
/// connection thread; this guard does.
struct InterruptOnDrop {
  handle: Option<Arc<InterruptHandle>>,
}

impl InterruptOnDrop {
  fn new(handle: Arc<InterruptHandle>) -> Self {
    Self { handle: Some(handle) }
  }

  fn disarm(mut self) {
    self.handle = None;
  }
}

impl Drop for InterruptOnDrop {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.interrupt();
      debug!("abandoned population query interrupted");
    }
  }
}

impl CharacterStore {
  /// Describe a character database without touching it.
  ///
  /// `table` must be a plain SQL identifier (optionally schema-qualified);
  /// it is interpolated into the count query once, here.
  pub fn new(path: impl AsRef<Path>, table: &str, query_timeout: Duration) -> Result<Self> {
    let count_sql = count_online_sql(table)?;
    Ok(Self {
      path: Arc::from(path.as_ref()),
      count_sql: count_sql.into(),
      query_timeout,
      live: Arc::new(Mutex::new(None)),
    })
  }

  /// Open an existing character database in read-only mode, failing now
  /// if it cannot be opened.
  pub async fn open_read_only(
    path: impl AsRef<Path>,
    table: &str,
    query_timeout: Duration,
  ) -> Result<Self> {
    let store = Self::new(path, table, query_timeout)?;
    store.connect().await?;
    Ok(store)
  }

  /// Make sure a connection is open. Later queries reopen it as needed.
  pub async fn connect(&self) -> Result<()> {
    let mut live = self.live.lock().await;
    if live.is_none() {
      *live = Some(self.open().await?);
    }
    Ok(())
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The per-query deadline applied by [`CharacterStore::count_online`].
  pub fn query_timeout(&self) -> Duration {
    self.query_timeout
  }

  /// Count characters currently flagged online.
  ///
  /// Returns [`DbError::Timeout`] if opening and querying do not finish
  /// within the store's query timeout. A statement still running when this
  /// future is dropped, by the timeout or by the caller, is interrupted.
  pub async fn count_online(&self) -> Result<u32> {
    let count = match tokio::time::timeout(self.query_timeout, self.query_count()).await {
      Ok(result) => result?,
      Err(_) => {
        warn!(timeout = ?self.query_timeout, "population query timed out, interrupted");
        return Err(DbError::Timeout(self.query_timeout));
      }
    };

    let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
    debug!(count, "counted online characters");
    Ok(count)
  }

  async fn query_count(&self) -> Result<i64> {
    let mut slot = self.live.lock().await;
    let live = match slot.as_ref() {
      Some(live) => live.clone(),
      None => {
        let live = self.open().await?;
        *slot = Some(live.clone());
        live
      }
    };

    let guard = InterruptOnDrop::new(Arc::clone(&live.interrupt));
    let sql = Arc::clone(&self.count_sql);
    let result = live
      .conn
      .call(move |conn| conn.query_row(&sql, [], |row| row.get::<_, i64>(0)))
      .await;
    guard.disarm();

    match result {
      Ok(count) => Ok(count),
      Err(e) => {
        // Reopen on the next query.
        *slot = None;
        Err(DbError::from(e))
      }
    }
  }

  async fn open(&self) -> Result<LiveConnection> {
    let connected = async {
      let conn = Connection::open_with_flags(
        self.path.to_path_buf(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
      )
      .await?;
      let interrupt = conn
        .call(|conn| Ok::<_, rusqlite::Error>(conn.get_interrupt_handle()))
        .await?;
      Ok::<_, DbError>(LiveConnection {
        conn,
        interrupt: Arc::new(interrupt),
      })
    };

    match connected.await {
      Ok(live) => {
        info!(path = %self.path.display(), "character store opened read-only");
        Ok(live)
      }
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "character store unavailable");
        Err(DbError::Open {
          path: self.path.display().to_string(),
          reason: e.to_string(),
        })
      }
    }
  }
}

/// Build the aggregate count query for `table`.
fn count_online_sql(table: &str) -> Result<String> {
  if !is_valid_table_name(table) {
    return Err(DbError::InvalidTableName(table.to_string()));
  }
  Ok(format!("SELECT COUNT(*) FROM {table} WHERE online > 0"))
}

/// Accepts `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`.
fn is_valid_table_name(table: &str) -> bool {
  let mut parts = 0;
  for part in table.split('.') {
    parts += 1;
    let mut chars = part.chars();
    let head_ok = chars
      .next()
      .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
      return false;
    }
  }
  parts <= 2
}
