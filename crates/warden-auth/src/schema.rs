//! Identity tables.
//!
//! A *connection* is one `(ip, cuid hash)` pair seen by the server and is
//! the broadest player identifier. A connection may be linked to another
//! connection or to an account, never both. Links are redirections: the
//! linked record stays in place and the link can be removed again.
//! Readers that want the effective identity follow at most one link, see
//! [`resolve_effective`].
//!
//! New connections are temporary. Naming, linking, account binding and
//! capture records make them permanent (enforced by triggers). Temporary
//! connections not seen for [`TEMPORARY_RETENTION_SECS`] are purged.

use tracing::{debug, info};
use warden_store::{PreparedStatement, Step, Store};

use crate::AuthError;

/// Retention for temporary connections.
pub const TEMPORARY_RETENTION_SECS: i64 = 30 * 24 * 60 * 60;

const CREATE_CONNECTIONS: &str = "
CREATE TABLE IF NOT EXISTS [connections] (
    [connection_id] INTEGER NOT NULL,
    [ip_int] INTEGER NOT NULL,
    [cuid_hash] TEXT,
    [last_seen] INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    [playtime] INTEGER NOT NULL DEFAULT 0,
    [linked_connection] INTEGER DEFAULT NULL,
    [linked_account] INTEGER DEFAULT NULL,
    [temporary] INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY ( [connection_id] ),
    UNIQUE ( [ip_int], [cuid_hash] ),
    UNIQUE ( [linked_account] ),
    FOREIGN KEY ( [linked_connection] ) REFERENCES connections ( [connection_id] ) ON DELETE SET DEFAULT,
    FOREIGN KEY ( [linked_account] ) REFERENCES accounts ( [account_id] ) ON DELETE SET DEFAULT,
    CHECK ( ( [linked_connection] IS NULL ) OR ( [linked_account] IS NULL ) )
);";

// Accounts are created by admins only.
const CREATE_ACCOUNTS: &str = "
CREATE TABLE IF NOT EXISTS [accounts] (
    [account_id] INTEGER NOT NULL,
    [linked_connection] INTEGER NOT NULL,
    [name] TEXT NOT NULL,
    [group] TEXT DEFAULT NULL,
    PRIMARY KEY ( [account_id] ),
    UNIQUE ( [linked_connection] ),
    FOREIGN KEY ( [linked_connection] ) REFERENCES connections ( [connection_id] ) ON DELETE RESTRICT
);";

const CREATE_NICKNAMES: &str = "
CREATE TABLE IF NOT EXISTS [nicknames] (
    [name] TEXT NOT NULL,
    [duration] INTEGER NOT NULL DEFAULT 0,
    [linked_connection] INTEGER NOT NULL,
    UNIQUE ( [name], [linked_connection] ),
    FOREIGN KEY ( [linked_connection] ) REFERENCES connections ( [connection_id] ) ON DELETE CASCADE
);";

const CREATE_FASTCAPS: &str = "
CREATE TABLE IF NOT EXISTS [fastcaps] (
    [fastcap_id] INTEGER NOT NULL,
    [mapname] TEXT NOT NULL,
    [type] INTEGER NOT NULL,
    [time] INTEGER NOT NULL,
    [linked_connection] INTEGER NOT NULL,
    [capture_time_ms] INTEGER NOT NULL,
    [whose_flag] INTEGER NOT NULL,
    [pickup_speed] INTEGER NOT NULL,
    [capture_speed] INTEGER NOT NULL,
    [max_speed] INTEGER NOT NULL,
    [average_speed] INTEGER NOT NULL,
    [demo_match_id] TEXT,
    [demo_client_name] TEXT NOT NULL,
    [demo_client_id] INTEGER NOT NULL,
    [demo_pickup_time] INTEGER NOT NULL,
    PRIMARY KEY ( [fastcap_id] ),
    FOREIGN KEY ( [linked_connection] ) REFERENCES connections ( [connection_id] ) ON DELETE RESTRICT
);";

const CREATE_PERMANENCE_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS [connections_link_permanent]
AFTER UPDATE OF [linked_connection], [linked_account] ON [connections]
WHEN NEW.[linked_connection] IS NOT NULL OR NEW.[linked_account] IS NOT NULL
BEGIN
    UPDATE [connections] SET [temporary] = 0
    WHERE [connection_id] IN ( NEW.[connection_id], NEW.[linked_connection] );
END;

CREATE TRIGGER IF NOT EXISTS [accounts_permanent]
AFTER INSERT ON [accounts]
BEGIN
    UPDATE [connections] SET [temporary] = 0 WHERE [connection_id] = NEW.[linked_connection];
END;

CREATE TRIGGER IF NOT EXISTS [nicknames_permanent]
AFTER INSERT ON [nicknames]
BEGIN
    UPDATE [connections] SET [temporary] = 0 WHERE [connection_id] = NEW.[linked_connection];
END;

CREATE TRIGGER IF NOT EXISTS [fastcaps_permanent]
AFTER INSERT ON [fastcaps]
BEGIN
    UPDATE [connections] SET [temporary] = 0 WHERE [connection_id] = NEW.[linked_connection];
END;
";

/// Create every identity table and trigger that does not exist yet.
///
/// Safe to run on every startup.
pub fn init_schema(store: &Store) -> Result<(), AuthError> {
    let ddl = [
        CREATE_CONNECTIONS,
        CREATE_ACCOUNTS,
        CREATE_NICKNAMES,
        CREATE_FASTCAPS,
        CREATE_PERMANENCE_TRIGGERS,
    ]
    .concat();

    store.execute(&ddl)?;
    debug!("identity schema ready");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub connection_id: i64,
    pub ip_int: i64,
    pub cuid_hash: Option<String>,
    pub last_seen: i64,
    pub playtime: i64,
    pub linked_connection: Option<i64>,
    pub linked_account: Option<i64>,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_id: i64,
    pub linked_connection: i64,
    pub name: String,
    pub group: Option<String>,
}

/// Record that reads and writes for a connection should go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveIdentity {
    Connection(ConnectionRecord),
    Account(AccountRecord),
}

/// Decides whether a freshly created connection should be linked to an
/// existing one.
///
/// Automatic merging is left to the game layer; this crate only ships
/// [`NoAutoLink`].
pub trait LinkPolicy {
    /// Connection the new record should point at, if any.
    fn link_target(
        &self,
        store: &Store,
        new: &ConnectionRecord,
    ) -> Result<Option<i64>, AuthError>;
}

/// Never links automatically.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAutoLink;

impl LinkPolicy for NoAutoLink {
    fn link_target(&self, _: &Store, _: &ConnectionRecord) -> Result<Option<i64>, AuthError> {
        Ok(None)
    }
}

const SELECT_CONNECTION_ID: &str =
    "SELECT connection_id FROM connections WHERE ip_int = ?1 AND cuid_hash IS ?2";
const UPDATE_LAST_SEEN: &str = "UPDATE connections SET last_seen = ?2 WHERE connection_id = ?1";
const INSERT_CONNECTION: &str =
    "INSERT INTO connections (ip_int, cuid_hash, last_seen) VALUES (?1, ?2, ?3)";
const SELECT_LAST_ID: &str = "SELECT last_insert_rowid()";
const SELECT_CONNECTION: &str = "SELECT connection_id, ip_int, cuid_hash, last_seen, playtime, \
     linked_connection, linked_account, temporary FROM connections WHERE connection_id = ?1";
const SELECT_ACCOUNT: &str =
    "SELECT account_id, linked_connection, name, [group] FROM accounts WHERE account_id = ?1";
const LINK_CONNECTION: &str =
    "UPDATE connections SET linked_connection = ?2 WHERE connection_id = ?1";
const PURGE_TEMPORARY: &str = "DELETE FROM connections WHERE temporary = 1 AND last_seen < ?1";
const ADD_PLAYTIME: &str =
    "UPDATE connections SET playtime = playtime + ?2 WHERE connection_id = ?1";

fn bind_cuid(stmt: &mut impl PreparedStatement, index: usize, cuid: Option<&str>) -> Result<(), AuthError> {
    match cuid {
        Some(hash) => stmt.bind_text(index, hash)?,
        None => stmt.bind_null(index)?,
    }
    Ok(())
}

fn optional_i64(stmt: &impl PreparedStatement, index: usize) -> Result<Option<i64>, AuthError> {
    Ok(match stmt.column_text(index)? {
        Some(_) => Some(stmt.column_i64(index)?),
        None => None,
    })
}

/// Find or create the connection for `(ip_int, cuid_hash)` and mark it seen
/// at `now`. Returns the connection id.
///
/// A newly created connection is offered to `policy` for linking.
pub fn touch_connection(
    store: &Store,
    policy: &dyn LinkPolicy,
    ip_int: i64,
    cuid_hash: Option<&str>,
    now: i64,
) -> Result<i64, AuthError> {
    let mut select = store.prepare(SELECT_CONNECTION_ID)?;
    select.bind_i64(1, ip_int)?;
    bind_cuid(&mut select, 2, cuid_hash)?;

    if select.step()? == Step::Row {
        let id = select.column_i64(0)?;
        let mut update = store.prepare(UPDATE_LAST_SEEN)?;
        update.bind_i64(1, id)?;
        update.bind_i64(2, now)?;
        update.step()?;
        return Ok(id);
    }

    let mut insert = store.prepare(INSERT_CONNECTION)?;
    insert.bind_i64(1, ip_int)?;
    bind_cuid(&mut insert, 2, cuid_hash)?;
    insert.bind_i64(3, now)?;
    insert.step()?;

    let mut last = store.prepare(SELECT_LAST_ID)?;
    last.step()?;
    let id = last.column_i64(0)?;
    debug!(connection_id = id, "created connection record");

    if let Some(created) = fetch_connection(store, id)? {
        if let Some(target) = policy.link_target(store, &created)? {
            link_connection(store, id, target)?;
            info!(connection_id = id, target, "linked new connection");
        }
    }

    Ok(id)
}

pub fn fetch_connection(store: &Store, connection_id: i64) -> Result<Option<ConnectionRecord>, AuthError> {
    let mut stmt = store.prepare(SELECT_CONNECTION)?;
    stmt.bind_i64(1, connection_id)?;
    if stmt.step()? == Step::Done {
        return Ok(None);
    }

    Ok(Some(ConnectionRecord {
        connection_id: stmt.column_i64(0)?,
        ip_int: stmt.column_i64(1)?,
        cuid_hash: stmt.column_text(2)?,
        last_seen: stmt.column_i64(3)?,
        playtime: stmt.column_i64(4)?,
        linked_connection: optional_i64(&stmt, 5)?,
        linked_account: optional_i64(&stmt, 6)?,
        temporary: stmt.column_bool(7)?,
    }))
}

pub fn fetch_account(store: &Store, account_id: i64) -> Result<Option<AccountRecord>, AuthError> {
    let mut stmt = store.prepare(SELECT_ACCOUNT)?;
    stmt.bind_i64(1, account_id)?;
    if stmt.step()? == Step::Done {
        return Ok(None);
    }

    Ok(Some(AccountRecord {
        account_id: stmt.column_i64(0)?,
        linked_connection: stmt.column_i64(1)?,
        name: stmt.column_text(2)?.unwrap_or_default(),
        group: stmt.column_text(3)?,
    }))
}

/// Point `connection_id` at `target`. The link replaces any previous one.
pub fn link_connection(store: &Store, connection_id: i64, target: i64) -> Result<(), AuthError> {
    let mut stmt = store.prepare(LINK_CONNECTION)?;
    stmt.bind_i64(1, connection_id)?;
    stmt.bind_i64(2, target)?;
    stmt.step()?;
    Ok(())
}

/// Follow zero or one outgoing link from `connection_id`.
///
/// A link to a connection that itself links further is not followed again.
pub fn resolve_effective(
    store: &Store,
    connection_id: i64,
) -> Result<Option<EffectiveIdentity>, AuthError> {
    let Some(record) = fetch_connection(store, connection_id)? else {
        return Ok(None);
    };

    if let Some(account_id) = record.linked_account {
        if let Some(account) = fetch_account(store, account_id)? {
            return Ok(Some(EffectiveIdentity::Account(account)));
        }
    }
    if let Some(target) = record.linked_connection {
        if let Some(linked) = fetch_connection(store, target)? {
            return Ok(Some(EffectiveIdentity::Connection(linked)));
        }
    }

    Ok(Some(EffectiveIdentity::Connection(record)))
}

/// Delete temporary connections last seen more than
/// [`TEMPORARY_RETENTION_SECS`] before `now`. Returns how many went.
pub fn purge_stale_temporary(store: &Store, now: i64) -> Result<usize, AuthError> {
    let mut stmt = store.prepare(PURGE_TEMPORARY)?;
    stmt.bind_i64(1, now - TEMPORARY_RETENTION_SECS)?;
    stmt.step()?;
    drop(stmt);

    let mut changes = store.prepare("SELECT changes()")?;
    changes.step()?;
    let purged = changes.column_i64(0)? as usize;

    if purged > 0 {
        info!(purged, "purged stale temporary connections");
    }
    Ok(purged)
}

/// Add `seconds` to a connection's accumulated playtime.
pub fn record_playtime(store: &Store, connection_id: i64, seconds: i64) -> Result<(), AuthError> {
    let mut stmt = store.prepare(ADD_PLAYTIME)?;
    stmt.bind_i64(1, connection_id)?;
    stmt.bind_i64(2, seconds)?;
    stmt.step()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn store() -> Store {
        let mut store = Store::new();
        store.open_in_memory().unwrap();
        init_schema(&store).unwrap();
        store
    }

    #[test]
    fn test_init_is_idempotent() {
        let store = store();
        init_schema(&store).unwrap();
        init_schema(&store).unwrap();
    }

    #[test]
    fn test_touch_creates_then_reuses() {
        let store = store();
        let a = touch_connection(&store, &NoAutoLink, 0x7f000001, Some("hash"), NOW).unwrap();
        let b = touch_connection(&store, &NoAutoLink, 0x7f000001, Some("hash"), NOW + 10).unwrap();
        assert_eq!(a, b);

        let record = fetch_connection(&store, a).unwrap().unwrap();
        assert_eq!(record.last_seen, NOW + 10);
        assert!(record.temporary);
        assert_eq!(record.playtime, 0);

        let c = touch_connection(&store, &NoAutoLink, 0x7f000002, Some("hash"), NOW).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_touch_without_cuid_reuses_record() {
        let store = store();
        let a = touch_connection(&store, &NoAutoLink, 1, None, NOW).unwrap();
        let b = touch_connection(&store, &NoAutoLink, 1, None, NOW).unwrap();
        assert_eq!(a, b);
        assert_eq!(fetch_connection(&store, a).unwrap().unwrap().cuid_hash, None);
    }

    #[test]
    fn test_link_and_account_are_exclusive() {
        let store = store();
        let a = touch_connection(&store, &NoAutoLink, 1, Some("a"), NOW).unwrap();
        let b = touch_connection(&store, &NoAutoLink, 2, Some("b"), NOW).unwrap();

        store
            .execute(&format!(
                "INSERT INTO accounts (account_id, linked_connection, name) VALUES (1, {b}, 'admin')"
            ))
            .unwrap();
        link_connection(&store, a, b).unwrap();

        assert!(store
            .execute(&format!("UPDATE connections SET linked_account = 1 WHERE connection_id = {a}"))
            .is_err());
    }

    #[test]
    fn test_resolve_follows_one_hop() {
        let store = store();
        let a = touch_connection(&store, &NoAutoLink, 1, Some("a"), NOW).unwrap();
        let b = touch_connection(&store, &NoAutoLink, 2, Some("b"), NOW).unwrap();
        let c = touch_connection(&store, &NoAutoLink, 3, Some("c"), NOW).unwrap();
        link_connection(&store, a, b).unwrap();
        link_connection(&store, b, c).unwrap();

        match resolve_effective(&store, a).unwrap().unwrap() {
            EffectiveIdentity::Connection(record) => assert_eq!(record.connection_id, b),
            other => panic!("unexpected identity: {other:?}"),
        }
        match resolve_effective(&store, c).unwrap().unwrap() {
            EffectiveIdentity::Connection(record) => assert_eq!(record.connection_id, c),
            other => panic!("unexpected identity: {other:?}"),
        }
        assert!(resolve_effective(&store, 999).unwrap().is_none());
    }

    #[test]
    fn test_resolve_to_account() {
        let store = store();
        let anchor = touch_connection(&store, &NoAutoLink, 1, Some("a"), NOW).unwrap();
        let alt = touch_connection(&store, &NoAutoLink, 2, Some("a"), NOW).unwrap();
        store
            .execute(&format!(
                "INSERT INTO accounts (account_id, linked_connection, name, [group]) \
                 VALUES (5, {anchor}, 'padawan', 'admins');
                 UPDATE connections SET linked_account = 5 WHERE connection_id = {alt};"
            ))
            .unwrap();

        let expected = AccountRecord {
            account_id: 5,
            linked_connection: anchor,
            name: "padawan".into(),
            group: Some("admins".into()),
        };
        assert_eq!(
            resolve_effective(&store, alt).unwrap(),
            Some(EffectiveIdentity::Account(expected))
        );
    }

    #[test]
    fn test_durable_events_make_permanent() {
        let store = store();
        let named = touch_connection(&store, &NoAutoLink, 1, Some("n"), NOW).unwrap();
        let linked = touch_connection(&store, &NoAutoLink, 2, Some("l"), NOW).unwrap();
        let target = touch_connection(&store, &NoAutoLink, 3, Some("t"), NOW).unwrap();
        let untouched = touch_connection(&store, &NoAutoLink, 4, Some("u"), NOW).unwrap();

        store
            .execute(&format!(
                "INSERT INTO nicknames (name, linked_connection) VALUES ('pad', {named})"
            ))
            .unwrap();
        link_connection(&store, linked, target).unwrap();

        let temporary = |id| fetch_connection(&store, id).unwrap().unwrap().temporary;
        assert!(!temporary(named));
        assert!(!temporary(linked));
        assert!(!temporary(target));
        assert!(temporary(untouched));
    }

    #[test]
    fn test_purge_only_stale_temporary() {
        let store = store();
        let stale = touch_connection(&store, &NoAutoLink, 1, Some("s"), NOW).unwrap();
        let fresh = touch_connection(&store, &NoAutoLink, 2, Some("f"), NOW + TEMPORARY_RETENTION_SECS).unwrap();
        let kept = touch_connection(&store, &NoAutoLink, 3, Some("k"), NOW).unwrap();
        store
            .execute(&format!(
                "INSERT INTO nicknames (name, linked_connection) VALUES ('pad', {kept})"
            ))
            .unwrap();

        let purged = purge_stale_temporary(&store, NOW + TEMPORARY_RETENTION_SECS + 1).unwrap();
        assert_eq!(purged, 1);
        assert!(fetch_connection(&store, stale).unwrap().is_none());
        assert!(fetch_connection(&store, fresh).unwrap().is_some());
        assert!(fetch_connection(&store, kept).unwrap().is_some());
    }

    #[test]
    fn test_nicknames_cascade_and_fastcaps_restrict() {
        let store = store();
        let a = touch_connection(&store, &NoAutoLink, 1, Some("a"), NOW).unwrap();
        let b = touch_connection(&store, &NoAutoLink, 2, Some("b"), NOW).unwrap();
        store
            .execute(&format!(
                "INSERT INTO nicknames (name, linked_connection) VALUES ('x', {a});
                 INSERT INTO fastcaps (mapname, type, time, linked_connection, capture_time_ms,
                     whose_flag, pickup_speed, capture_speed, max_speed, average_speed,
                     demo_client_name, demo_client_id, demo_pickup_time)
                 VALUES ('mp/ctf1', 0, {NOW}, {b}, 12000, 1, 500, 600, 900, 700, 'pad', 0, 0);"
            ))
            .unwrap();

        store
            .execute(&format!("DELETE FROM connections WHERE connection_id = {a}"))
            .unwrap();
        let mut remaining = store.prepare("SELECT COUNT(*) FROM nicknames").unwrap();
        remaining.step().unwrap();
        assert_eq!(remaining.column_i64(0).unwrap(), 0);

        assert!(store
            .execute(&format!("DELETE FROM connections WHERE connection_id = {b}"))
            .is_err());
    }

    #[test]
    fn test_playtime_accumulates() {
        let store = store();
        let id = touch_connection(&store, &NoAutoLink, 1, Some("a"), NOW).unwrap();
        record_playtime(&store, id, 60).unwrap();
        record_playtime(&store, id, 30).unwrap();
        assert_eq!(fetch_connection(&store, id).unwrap().unwrap().playtime, 90);
    }

    struct LinkToFirst;

    impl LinkPolicy for LinkToFirst {
        fn link_target(&self, _: &Store, new: &ConnectionRecord) -> Result<Option<i64>, AuthError> {
            Ok((new.connection_id != 1).then_some(1))
        }
    }

    #[test]
    fn test_policy_links_new_connections() {
        let store = store();
        let first = touch_connection(&store, &LinkToFirst, 1, Some("a"), NOW).unwrap();
        let second = touch_connection(&store, &LinkToFirst, 2, Some("a"), NOW).unwrap();
        assert_eq!(first, 1);

        let record = fetch_connection(&store, second).unwrap().unwrap();
        assert_eq!(record.linked_connection, Some(first));
    }
}
