use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::models::FeesStructure;
use crate::{proceeds, Payload};

const fn fees(per_semester: u32) -> FeesStructure {
    FeesStructure {
        sem1: per_semester,
        sem2: per_semester,
        total: per_semester * 2,
    }
}

pub const DEFAULT_FEES: FeesStructure = fees(50_000);

lazy_static! {
    pub static ref FEES_BY_BRANCH: BTreeMap<&'static str, FeesStructure> = BTreeMap::from([
        ("CSE", fees(55_000)),
        ("ECE", fees(52_000)),
        ("MECH", fees(48_000)),
        ("CIVIL", fees(45_000)),
    ]);
}

/// Fee table for an already normalized branch name.
pub fn fees_for(branch: &str) -> FeesStructure {
    FEES_BY_BRANCH.get(branch).copied().unwrap_or(DEFAULT_FEES)
}

pub async fn list_fees() -> Payload<BTreeMap<&'static str, FeesStructure>> {
    proceeds(FEES_BY_BRANCH.clone())
}
