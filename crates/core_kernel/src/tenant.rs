//! Tenant scope and acting user
//!
//! Every ledger operation runs on behalf of an authenticated actor inside
//! exactly one school. The session layer builds a [`TenantContext`]; the
//! core never operates without one.

use crate::identifiers::{SchoolId, UserId};
use crate::ports::OperationMetadata;

/// Tenant scope plus actor identity for a single request
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// The school whose data may be read or written
    pub school_id: SchoolId,
    /// The user performing the operation (recorded as `processed_by`/`created_by`)
    pub actor_id: UserId,
    /// Correlation data carried into logs
    pub metadata: OperationMetadata,
}

impl TenantContext {
    pub fn new(school_id: SchoolId, actor_id: UserId) -> Self {
        Self {
            school_id,
            actor_id,
            metadata: OperationMetadata::default(),
        }
    }

    /// Attaches a correlation id (typically the HTTP request id)
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }

    /// Correlation id for log fields, or `-` when none was supplied
    pub fn correlation_id(&self) -> &str {
        self.metadata.correlation_id.as_deref().unwrap_or("-")
    }
}
