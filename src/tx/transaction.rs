//! A global transaction spanning enlisted datasources, committed with PostgreSQL two-phase commit.
//!
//! Servers taking part need `max_prepared_transactions > 0`.

use crate::error::XaError;
use crate::tx::coordinator::{TransactionCoordinator, XaResource};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BranchState {
    Active,
    Prepared,
}

struct Branch {
    resource: Arc<XaResource>,
    conn: PoolConnection<Postgres>,
    gid: String,
    state: BranchState,
}

pub struct GlobalTransaction {
    xid: uuid::Uuid,
    coordinator: Arc<TransactionCoordinator>,
    branches: Vec<Branch>,
    rollback_only: bool,
}

impl GlobalTransaction {
    pub(crate) fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        let xid = uuid::Uuid::new_v4();
        tracing::debug!(xid = %xid, "global transaction begun");
        GlobalTransaction {
            xid,
            coordinator,
            branches: Vec::new(),
            rollback_only: false,
        }
    }

    pub fn xid(&self) -> uuid::Uuid {
        self.xid
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// After this, `commit` rolls every branch back and returns [`XaError::RollbackOnly`].
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Connection of the branch on `logical`, opening the branch on first use.
    pub async fn connection(&mut self, logical: &str) -> Result<&mut PgConnection, XaError> {
        let idx = match self
            .branches
            .iter()
            .position(|b| b.resource.logical_name() == logical)
        {
            Some(i) => i,
            None => {
                let resource = self
                    .coordinator
                    .resource(logical)
                    .ok_or_else(|| XaError::UnknownResource(logical.to_string()))?;
                let mut conn = resource.source().pool().acquire().await?;
                sqlx::query("BEGIN").execute(&mut *conn).await?;
                let gid = format!("{}-{}", self.xid.simple(), self.branches.len());
                tracing::debug!(xid = %self.xid, resource = %resource.unique_name(), gid = %gid, "branch opened");
                self.branches.push(Branch {
                    resource,
                    conn,
                    gid,
                    state: BranchState::Active,
                });
                self.branches.len() - 1
            }
        };
        Ok(&mut *self.branches[idx].conn)
    }

    /// One branch commits directly; several go through prepare then commit-prepared.
    /// A branch whose transaction already failed makes the whole commit fail.
    pub async fn commit(mut self) -> Result<(), XaError> {
        let mut branches = std::mem::take(&mut self.branches);
        if branches.is_empty() {
            return Ok(());
        }
        if self.rollback_only {
            tracing::warn!(xid = %self.xid, "rollback-only transaction, rolling back");
            rollback_branches(self.xid, &mut branches, None).await;
            return Err(XaError::RollbackOnly(self.xid));
        }
        // COMMIT and PREPARE TRANSACTION on an aborted transaction roll back without an error
        if let Some(i) = first_aborted(&mut branches).await {
            let resource = branches[i].resource.unique_name().to_string();
            tracing::warn!(xid = %self.xid, resource = %resource, "branch aborted, rolling back");
            branches[i].conn.close_on_drop();
            let gid = branches[i].gid.clone();
            rollback_branches(self.xid, &mut branches, Some(&gid)).await;
            return Err(XaError::BranchAborted(resource));
        }

        if branches.len() == 1 {
            let b = &mut branches[0];
            if let Err(e) = sqlx::query("COMMIT").execute(&mut *b.conn).await {
                b.conn.close_on_drop();
                return Err(e.into());
            }
            tracing::debug!(xid = %self.xid, "one-phase commit");
            return Ok(());
        }

        for i in 0..branches.len() {
            let sql = format!("PREPARE TRANSACTION '{}'", branches[i].gid);
            if let Err(source) = sqlx::query(&sql).execute(&mut *branches[i].conn).await {
                let resource = branches[i].resource.unique_name().to_string();
                tracing::warn!(xid = %self.xid, resource = %resource, error = %source, "prepare failed, rolling back");
                // a failed PREPARE already rolled that branch back server-side
                branches[i].conn.close_on_drop();
                let failed_gid = branches[i].gid.clone();
                rollback_branches(self.xid, &mut branches, Some(&failed_gid)).await;
                return Err(XaError::Prepare { resource, source });
            }
            branches[i].state = BranchState::Prepared;
        }

        let mut first_err = None;
        for b in &mut branches {
            let sql = format!("COMMIT PREPARED '{}'", b.gid);
            if let Err(e) = sqlx::query(&sql).execute(&mut *b.conn).await {
                tracing::error!(xid = %self.xid, resource = %b.resource.unique_name(), gid = %b.gid, error = %e, "commit prepared failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => {
                tracing::debug!(xid = %self.xid, branches = branches.len(), "two-phase commit done");
                Ok(())
            }
        }
    }

    pub async fn rollback(mut self) -> Result<(), XaError> {
        let mut branches = std::mem::take(&mut self.branches);
        rollback_branches(self.xid, &mut branches, None).await;
        Ok(())
    }
}

/// Index of the first branch that can no longer run statements.
async fn first_aborted(branches: &mut [Branch]) -> Option<usize> {
    for (i, b) in branches.iter_mut().enumerate() {
        if let Err(e) = sqlx::query("SELECT 1").execute(&mut *b.conn).await {
            tracing::debug!(resource = %b.resource.unique_name(), error = %e, "branch check failed");
            return Some(i);
        }
    }
    None
}

async fn rollback_branches(xid: uuid::Uuid, branches: &mut [Branch], skip_gid: Option<&str>) {
    for b in branches.iter_mut() {
        if skip_gid == Some(b.gid.as_str()) {
            continue;
        }
        let sql = match b.state {
            BranchState::Active => "ROLLBACK".to_string(),
            BranchState::Prepared => format!("ROLLBACK PREPARED '{}'", b.gid),
        };
        if let Err(e) = sqlx::query(&sql).execute(&mut *b.conn).await {
            tracing::warn!(xid = %xid, resource = %b.resource.unique_name(), error = %e, "branch rollback failed");
            b.conn.close_on_drop();
        }
    }
}

impl std::fmt::Debug for GlobalTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalTransaction")
            .field("xid", &self.xid)
            .field("branches", &self.branches.len())
            .field("rollback_only", &self.rollback_only)
            .finish()
    }
}

impl Drop for GlobalTransaction {
    fn drop(&mut self) {
        if self.branches.is_empty() {
            return;
        }
        tracing::warn!(xid = %self.xid, branches = self.branches.len(), "global transaction dropped without commit or rollback");
        // closing the connection makes the server abort the open branch
        for mut b in self.branches.drain(..) {
            b.conn.close_on_drop();
        }
    }
}
