use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use scc::HashMap;

use crate::ports::record_store::{
    BandwidthPlan, RecordStore, RecordStoreError, RecordStoreResult, Voucher,
};

/// Process-local record store.
///
/// Voucher codes and plan names are unique; ids are assigned from one
/// counter per record kind, starting at 1.
#[derive(Default)]
pub struct InMemoryRecordStore {
    vouchers: HashMap<u64, Voucher>,
    voucher_codes: HashMap<String, u64>,
    next_voucher_id: AtomicU64,
    plans: HashMap<u64, BandwidthPlan>,
    plan_names: HashMap<String, u64>,
    next_plan_id: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_voucher(&self, mut voucher: Voucher) -> RecordStoreResult<Voucher> {
        let id = self.next_voucher_id.fetch_add(1, Ordering::Relaxed) + 1;
        if self
            .voucher_codes
            .insert_async(voucher.code.clone(), id)
            .await
            .is_err()
        {
            return Err(RecordStoreError::Duplicate(format!(
                "voucher code {}",
                voucher.code
            )));
        }

        voucher.id = id;
        self.vouchers
            .insert_async(id, voucher.clone())
            .await
            .map_err(|_| RecordStoreError::Backend(format!("voucher id {id} already taken")))?;
        Ok(voucher)
    }

    async fn list_vouchers(&self) -> RecordStoreResult<Vec<Voucher>> {
        let mut vouchers = Vec::with_capacity(self.vouchers.len());
        self.vouchers.iter_sync(|_, voucher| {
            vouchers.push(voucher.clone());
            true
        });
        vouchers.sort_by_key(|v| v.id);
        Ok(vouchers)
    }

    async fn insert_plan(&self, mut plan: BandwidthPlan) -> RecordStoreResult<BandwidthPlan> {
        let id = self.next_plan_id.fetch_add(1, Ordering::Relaxed) + 1;
        if self
            .plan_names
            .insert_async(plan.name.clone(), id)
            .await
            .is_err()
        {
            return Err(RecordStoreError::Duplicate(format!(
                "bandwidth plan {}",
                plan.name
            )));
        }

        plan.id = id;
        self.plans
            .insert_async(id, plan.clone())
            .await
            .map_err(|_| RecordStoreError::Backend(format!("plan id {id} already taken")))?;
        Ok(plan)
    }

    async fn list_plans(&self) -> RecordStoreResult<Vec<BandwidthPlan>> {
        let mut plans = Vec::with_capacity(self.plans.len());
        self.plans.iter_sync(|_, plan| {
            plans.push(plan.clone());
            true
        });
        plans.sort_by_key(|p| p.id);
        Ok(plans)
    }
}
