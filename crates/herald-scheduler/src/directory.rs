use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, instrument};

use herald_core::{Client, ClientId, ConnectionId, Credential, PlatformConnection, PlatformKind};

use crate::db::{init_db, ts};
use crate::error::{Result, SchedulerError};

/// Answers whether a client may publish right now.
#[async_trait]
pub trait ClientGate: Send + Sync {
    /// `false` for suspended and for unknown clients.
    async fn is_active(&self, client: &ClientId) -> Result<bool>;
}

/// Read access to platform connections.
#[async_trait]
pub trait ConnectionDirectory: Send + Sync {
    async fn find(&self, id: &ConnectionId) -> Result<Option<PlatformConnection>>;
}

/// Resolves a connection to credentials the publisher can use directly.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, id: &ConnectionId) -> Result<Credential>;
}

/// SQLite-backed clients and connections.
///
/// Implements all three lookup traits over the same tables; the write
/// methods exist for provisioning and tests.
pub struct SqliteDirectory {
    db: Mutex<Connection>,
}

impl SqliteDirectory {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[instrument(skip(self, client), fields(client_id = %client.id))]
    pub fn upsert_client(&self, client: &Client) -> Result<()> {
        let now = ts(Utc::now());
        self.conn().execute(
            "INSERT INTO clients (id, name, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                updated_at = excluded.updated_at",
            rusqlite::params![client.id.as_str(), client.name, client.active, now],
        )?;
        info!(active = client.active, "client saved");
        Ok(())
    }

    /// Suspend (`false`) or reinstate (`true`) a client.
    #[instrument(skip(self), fields(client_id = %id))]
    pub fn set_client_active(&self, id: &ClientId, active: bool) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE clients SET active = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![active, ts(Utc::now()), id.as_str()],
        )?;
        if n == 0 {
            return Err(SchedulerError::ClientNotFound { id: id.to_string() });
        }
        info!(active, "client status changed");
        Ok(())
    }

    /// Store a connection together with its usable access token.
    #[instrument(skip(self, connection, access_token), fields(connection_id = %connection.id))]
    pub fn upsert_connection(&self, connection: &PlatformConnection, access_token: &str) -> Result<()> {
        let now = ts(Utc::now());
        self.conn().execute(
            "INSERT INTO connections
             (id, client_id, platform, page_id, business_id, display_name,
              access_token, active, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?9)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                platform = excluded.platform,
                page_id = excluded.page_id,
                business_id = excluded.business_id,
                display_name = excluded.display_name,
                access_token = excluded.access_token,
                active = excluded.active,
                updated_at = excluded.updated_at",
            rusqlite::params![
                connection.id.as_str(),
                connection.client_id.as_str(),
                connection.platform.as_str(),
                connection.page_id,
                connection.business_id,
                connection.display_name,
                access_token,
                connection.active,
                now,
            ],
        )?;
        info!(platform = %connection.platform, "connection saved");
        Ok(())
    }

    #[instrument(skip(self), fields(connection_id = %id))]
    pub fn deactivate_connection(&self, id: &ConnectionId) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE connections SET active = 0, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![ts(Utc::now()), id.as_str()],
        )?;
        if n == 0 {
            return Err(SchedulerError::ConnectionNotFound { id: id.to_string() });
        }
        info!("connection deactivated");
        Ok(())
    }
}

#[async_trait]
impl ClientGate for SqliteDirectory {
    async fn is_active(&self, client: &ClientId) -> Result<bool> {
        let active = self
            .conn()
            .query_row(
                "SELECT active FROM clients WHERE id = ?1",
                [client.as_str()],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(active.unwrap_or(false))
    }
}

#[async_trait]
impl ConnectionDirectory for SqliteDirectory {
    async fn find(&self, id: &ConnectionId) -> Result<Option<PlatformConnection>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, client_id, platform, page_id, business_id, display_name, active
                 FROM connections WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, bool>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, client_id, platform, page_id, business_id, display_name, active)) = row else {
            return Ok(None);
        };
        let platform = platform.parse::<PlatformKind>()?;
        Ok(Some(PlatformConnection {
            id: id.into(),
            client_id: client_id.into(),
            platform,
            page_id,
            business_id,
            display_name,
            active,
        }))
    }
}

#[async_trait]
impl CredentialStore for SqliteDirectory {
    async fn resolve(&self, id: &ConnectionId) -> Result<Credential> {
        let row = self
            .conn()
            .query_row(
                "SELECT access_token, page_id, business_id FROM connections WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(Credential {
                        access_token: row.get(0)?,
                        page_id: row.get(1)?,
                        business_id: row.get(2)?,
                    })
                },
            )
            .optional()?;

        match row {
            None => Err(SchedulerError::ConnectionNotFound { id: id.to_string() }),
            Some(cred) if cred.access_token.trim().is_empty() => {
                Err(SchedulerError::CredentialUnavailable {
                    id: id.to_string(),
                    reason: "no access token stored".to_string(),
                })
            }
            Some(cred) => Ok(cred),
        }
    }
}
