//! In-memory store implementing the full capability set.
//!
//! Used by tests and by embedders that do not need durable persistence.

use crate::approval::Approval;
use crate::error::StoreError;
use crate::store::{
    ActiveExecutionProbe, ApprovalHashStore, ApprovalTokenStore, Execution, PlanStore, StepLister,
    WorkflowBinder,
};
use async_trait::async_trait;
use opsgate_core::{Plan, PlanStep};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct MemoryInner {
    plans: HashMap<String, Plan>,
    approvals: HashMap<String, Approval>,
    executions: HashMap<String, Execution>,
    /// plan_id -> execution_id for executions that have not finished.
    active: HashMap<String, String>,
    hashes: HashMap<String, String>,
    tokens: HashMap<String, String>,
}

/// In-memory `PlanStore` with every optional capability.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark an execution finished, releasing the plan's active slot.
    pub fn finish_execution(&self, execution_id: &str) {
        let mut inner = self.write();
        inner
            .active
            .retain(|_, active_id| active_id != execution_id);
    }

    /// Register a single-use approval token for a plan.
    pub fn issue_token(&self, token: impl Into<String>, plan_id: impl Into<String>) {
        self.write().tokens.insert(token.into(), plan_id.into());
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn create_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        self.write().plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self.read().plans.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let mut plans: Vec<Plan> = self.read().plans.values().cloned().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(plans)
    }

    async fn create_approval(&self, approval: &Approval) -> Result<(), StoreError> {
        self.write()
            .approvals
            .insert(approval.plan_id.clone(), approval.clone());
        Ok(())
    }

    async fn get_approval(&self, plan_id: &str) -> Result<Option<Approval>, StoreError> {
        Ok(self.read().approvals.get(plan_id).cloned())
    }

    async fn update_approval(&self, approval: &Approval) -> Result<(), StoreError> {
        let mut inner = self.write();
        if !inner.approvals.contains_key(&approval.plan_id) {
            return Err(StoreError::Backend(format!(
                "no approval exists for plan {}",
                approval.plan_id
            )));
        }
        inner
            .approvals
            .insert(approval.plan_id.clone(), approval.clone());
        Ok(())
    }

    async fn create_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.active.contains_key(&execution.plan_id) {
            return Err(StoreError::Conflict(format!(
                "an execution is already active for plan {}",
                execution.plan_id
            )));
        }
        inner
            .active
            .insert(execution.plan_id.clone(), execution.execution_id.clone());
        inner
            .executions
            .insert(execution.execution_id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        Ok(self.read().executions.get(execution_id).cloned())
    }

    fn hash_store(&self) -> Option<&dyn ApprovalHashStore> {
        Some(self)
    }

    fn execution_probe(&self) -> Option<&dyn ActiveExecutionProbe> {
        Some(self)
    }

    fn workflow_binder(&self) -> Option<&dyn WorkflowBinder> {
        Some(self)
    }

    fn step_lister(&self) -> Option<&dyn StepLister> {
        Some(self)
    }

    fn token_store(&self) -> Option<&dyn ApprovalTokenStore> {
        Some(self)
    }
}

#[async_trait]
impl ApprovalHashStore for MemoryStore {
    async fn put_hash(&self, plan_id: &str, hash: &str) -> Result<(), StoreError> {
        self.write()
            .hashes
            .insert(plan_id.to_string(), hash.to_string());
        Ok(())
    }

    async fn get_hash(&self, plan_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read().hashes.get(plan_id).cloned())
    }
}

#[async_trait]
impl ActiveExecutionProbe for MemoryStore {
    async fn has_active_execution(&self, plan_id: &str) -> Result<bool, StoreError> {
        Ok(self.read().active.contains_key(plan_id))
    }
}

#[async_trait]
impl WorkflowBinder for MemoryStore {
    async fn bind_workflow(&self, execution_id: &str, workflow_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.executions.get_mut(execution_id) {
            Some(execution) => {
                execution.workflow_id = Some(workflow_id.to_string());
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "no execution {} to bind workflow to",
                execution_id
            ))),
        }
    }
}

#[async_trait]
impl StepLister for MemoryStore {
    async fn list_steps(&self, plan_id: &str) -> Result<Vec<PlanStep>, StoreError> {
        Ok(self
            .read()
            .plans
            .get(plan_id)
            .map(|plan| plan.steps.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ApprovalTokenStore for MemoryStore {
    async fn consume_token(&self, token: &str) -> Result<Option<Approval>, StoreError> {
        let mut inner = self.write();
        let Some(plan_id) = inner.tokens.remove(token) else {
            return Ok(None);
        };
        Ok(inner.approvals.get(&plan_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsgate_core::ContextRef;

    fn plan() -> Plan {
        Plan::new("restart api", ContextRef::default(), vec![])
    }

    #[tokio::test]
    async fn create_execution_enforces_one_active_per_plan() {
        let store = MemoryStore::new();
        let plan = plan();
        store.create_plan(&plan).await.unwrap();

        let first = Execution::new(&plan.plan_id);
        store.create_execution(&first).await.unwrap();

        let second = Execution::new(&plan.plan_id);
        let err = store.create_execution(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Finishing the first releases the slot.
        store.finish_execution(&first.execution_id);
        store.create_execution(&second).await.unwrap();
    }

    #[tokio::test]
    async fn tokens_are_single_use() {
        let store = MemoryStore::new();
        let approval = Approval::pending("plan-1");
        store.create_approval(&approval).await.unwrap();
        store.issue_token("tok-1", "plan-1");

        assert!(store.consume_token("tok-1").await.unwrap().is_some());
        assert!(store.consume_token("tok-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hash_round_trip() {
        let store = MemoryStore::new();
        store.put_hash("plan-1", "abc").await.unwrap();
        assert_eq!(store.get_hash("plan-1").await.unwrap().as_deref(), Some("abc"));
        assert!(store.get_hash("plan-2").await.unwrap().is_none());
    }
}
