//! Object Store Module
//!
//! Stores typed objects as hashes, one hash field per object field. Each
//! type declares its own field mapping through [`HashMapped`].
//!
//! Unlike [`CacheStore`](crate::cache::CacheStore), store failures are not
//! absorbed here: they propagate to the caller. Connection failures are still
//! reported to the connection source.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::entry::{validate_key, PREFIX_SEPARATOR};
use crate::connection::ConnectionSource;
use crate::error::{CacheError, Result, StoreError, StoreResult, TransientKind};
use crate::store::StoreConnection;

// == Hash Mapping ==
/// Explicit mapping between a type and its hash fields.
pub trait HashMapped: Sized {
    /// Type component of the stored key
    const TYPE_NAME: &'static str;

    /// Field name/value pairs to store. Unset optional fields are omitted.
    fn to_fields(&self) -> Vec<(String, String)>;

    /// Rebuilds the object from stored fields.
    fn from_fields(fields: &HashMap<String, String>) -> Result<Self>;
}

/// Parses an optional field. A missing field yields `None`.
pub fn parse_field<T>(fields: &HashMap<String, String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fields
        .get(name)
        .map(|raw| {
            raw.parse().map_err(|err: T::Err| {
                CacheError::Mapping(format!("field {name} has invalid value {raw:?}: {err}"))
            })
        })
        .transpose()
}

/// Parses a field that must be present.
pub fn require_field<T>(fields: &HashMap<String, String>, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_field(fields, name)?
        .ok_or_else(|| CacheError::Mapping(format!("field {name} is missing")))
}

// == Object Store ==
pub struct ObjectStore<S: ConnectionSource, T: HashMapped> {
    source: S,
    _marker: PhantomData<fn() -> T>,
}

impl<S: ConnectionSource, T: HashMapped> ObjectStore<S, T> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            _marker: PhantomData,
        }
    }

    /// Key under which `key` is stored: `key:type`, both lower-cased.
    pub fn object_key(key: &str) -> String {
        format!(
            "{}{PREFIX_SEPARATOR}{}",
            key.to_lowercase(),
            T::TYPE_NAME.to_lowercase()
        )
    }

    /// Fetches the object under `key`. An absent hash yields `None`.
    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        let object_key = Self::object_key(key);
        let fields = self.reported(self.fetch_fields(&object_key).await)?;
        if fields.is_empty() {
            debug!(key = %object_key, "Object MISS");
            return Ok(None);
        }
        T::from_fields(&fields).map(Some)
    }

    /// Writes every field of `object` under `key`.
    pub async fn save(&self, key: &str, object: &T) -> Result<()> {
        validate_key(key)?;
        let object_key = Self::object_key(key);
        self.reported(self.write_fields(&object_key, object.to_fields()).await)
    }

    /// Writes `object` and sets the whole hash to expire after `ttl`.
    pub async fn save_with_expiry(&self, key: &str, object: &T, ttl: Duration) -> Result<()> {
        validate_key(key)?;
        let object_key = Self::object_key(key);
        self.reported(self.write_fields(&object_key, object.to_fields()).await)?;
        self.reported(self.set_expiry(&object_key, ttl).await)?;
        Ok(())
    }

    /// Deletes the object under `key`. Returns `true` if one was removed.
    ///
    /// Blank keys and keys containing the separator are rejected.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        if key.trim().is_empty() || key.contains(PREFIX_SEPARATOR) {
            return Err(CacheError::Usage(format!("invalid key {key:?}")));
        }
        let object_key = Self::object_key(key);
        self.reported(self.erase(&object_key).await)
    }

    /// Whether the connection behind the next operation is up.
    pub async fn is_connected(&self) -> bool {
        let checkout = self.source.acquire().checkout();
        match checkout.connection().await {
            Ok(conn) => conn.is_connected(),
            Err(_) => false,
        }
    }

    // == Store Calls ==
    async fn fetch_fields(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.hash_get_all(key).await
    }

    async fn write_fields(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.hash_set(key, fields).await
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.expire(key, ttl).await
    }

    async fn erase(&self, key: &str) -> StoreResult<bool> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.delete(key).await
    }

    fn reported<R>(&self, result: StoreResult<R>) -> Result<R> {
        result.map_err(|err: StoreError| {
            if err.transient_kind() == Some(TransientKind::Connection) {
                warn!(error = %err, "Object store unreachable - will reconnect");
                self.source.notify_error();
            }
            CacheError::Store(err)
        })
    }
}

impl<S: ConnectionSource + fmt::Debug, T: HashMapped> fmt::Debug for ObjectStore<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("type_name", &T::TYPE_NAME)
            .field("source", &self.source)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectPolicy;
    use crate::connection::{ConnectionPool, ReconnectController};
    use crate::store::{Connector, MemoryConnector};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Session {
        user: String,
        logins: u32,
        admin: Option<bool>,
    }

    impl HashMapped for Session {
        const TYPE_NAME: &'static str = "Accounts.Session";

        fn to_fields(&self) -> Vec<(String, String)> {
            let mut fields = vec![
                ("user".to_string(), self.user.clone()),
                ("logins".to_string(), self.logins.to_string()),
            ];
            if let Some(admin) = self.admin {
                fields.push(("admin".to_string(), admin.to_string()));
            }
            fields
        }

        fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
            Ok(Self {
                user: require_field(fields, "user")?,
                logins: require_field(fields, "logins")?,
                admin: parse_field(fields, "admin")?,
            })
        }
    }

    fn session() -> Session {
        Session {
            user: "grace".to_string(),
            logins: 3,
            admin: None,
        }
    }

    fn new_store() -> (
        Arc<MemoryConnector>,
        ObjectStore<ConnectionPool<MemoryConnector>, Session>,
    ) {
        let connector = Arc::new(MemoryConnector::new());
        let pool = ConnectionPool::with_connector(Arc::clone(&connector), 2);
        (connector, ObjectStore::new(pool))
    }

    #[test]
    fn test_object_key_is_lowercased() {
        assert_eq!(
            ObjectStore::<ConnectionPool<MemoryConnector>, Session>::object_key("User-42"),
            "user-42:accounts.session"
        );
    }

    #[tokio::test]
    async fn test_object_save_and_get() {
        let (connector, store) = new_store();
        store.save("S1", &session()).await.unwrap();

        assert!(connector.backend().contains_key("s1:accounts.session"));
        assert_eq!(store.get("s1").await.unwrap(), Some(session()));
    }

    #[tokio::test]
    async fn test_object_get_missing() {
        let (_connector, store) = new_store();
        assert_eq!(store.get("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_object_optional_field_roundtrip() {
        let (_connector, store) = new_store();
        let admin = Session {
            admin: Some(true),
            ..session()
        };
        store.save("root", &admin).await.unwrap();
        assert_eq!(store.get("root").await.unwrap(), Some(admin));
    }

    #[tokio::test]
    async fn test_object_save_with_expiry() {
        let (connector, store) = new_store();
        store
            .save_with_expiry("s1", &session(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.get("s1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!connector.backend().contains_key("s1:accounts.session"));
        assert_eq!(store.get("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_object_delete() {
        let (_connector, store) = new_store();
        store.save("s1", &session()).await.unwrap();

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_object_delete_rejects_bad_keys() {
        let (_connector, store) = new_store();
        assert!(matches!(store.delete("").await, Err(CacheError::Usage(_))));
        assert!(matches!(store.delete("   ").await, Err(CacheError::Usage(_))));
        assert!(matches!(store.delete("a:b").await, Err(CacheError::Usage(_))));
    }

    #[tokio::test]
    async fn test_object_mapping_error() {
        let (connector, store) = new_store();
        let conn = connector.connect().await.unwrap();
        conn.hash_set(
            "bad:accounts.session",
            vec![
                ("user".to_string(), "x".to_string()),
                ("logins".to_string(), "many".to_string()),
            ],
        )
        .await
        .unwrap();

        assert!(matches!(store.get("bad").await, Err(CacheError::Mapping(_))));
    }

    #[tokio::test]
    async fn test_object_errors_propagate_and_notify() {
        let connector = Arc::new(MemoryConnector::new());
        let controller = Arc::new(ReconnectController::with_connector(
            Arc::clone(&connector),
            ReconnectPolicy::default(),
        ));
        let store: ObjectStore<_, Session> = ObjectStore::new(Arc::clone(&controller));

        connector
            .backend()
            .inject_failure(StoreError::Connection("socket reset".to_string()));
        let result = store.save("s1", &session()).await;
        assert!(matches!(result, Err(CacheError::Store(StoreError::Connection(_)))));
        assert!(controller.streak_started_at().is_some());

        connector
            .backend()
            .inject_failure(StoreError::Timeout("1000ms".to_string()));
        let result = store.get("s1").await;
        assert!(matches!(result, Err(CacheError::Store(StoreError::Timeout(_)))));
    }

    #[tokio::test]
    async fn test_object_is_connected() {
        let (connector, store) = new_store();
        assert!(store.is_connected().await);

        let refusing = Arc::new(MemoryConnector::new());
        refusing.backend().refuse_dials(true);
        let cold: ObjectStore<_, Session> =
            ObjectStore::new(ConnectionPool::with_connector(refusing, 1));
        assert!(!cold.is_connected().await);
        assert!(connector.backend().dial_count() >= 1);
    }
}
