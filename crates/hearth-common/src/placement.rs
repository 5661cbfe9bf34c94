use serde::{Deserialize, Serialize};

use crate::accelerator::AcceleratorPool;
use crate::error::PlacementError;

/// How models are spread over the pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// Decide from footprints: single-device, sharded, or packed.
    Auto,
    /// Force one device per model (packing path).
    Single,
    /// Force tensor-parallel sharding across the whole pool.
    Multi,
}

/// How devices are chosen during packing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Most-free-memory first, largest model first.
    Balanced,
    /// Catalog order round-robin over device indices.
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementPolicy {
    pub distribution_mode: DistributionMode,
    pub assignment_mode: AssignmentMode,
    /// Hard cap on models co-located on one device during packing.
    pub max_models_per_device: u32,
    /// Below this a model cannot be packed onto a device at all.
    pub min_memory_required_mb: u64,
    /// Allow a device's assigned footprint to exceed its memory, and large
    /// models to share a device.
    pub allow_overcommit: bool,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            distribution_mode: DistributionMode::Auto,
            assignment_mode: AssignmentMode::Balanced,
            max_models_per_device: 1,
            min_memory_required_mb: 2048,
            allow_overcommit: false,
        }
    }
}

/// A catalog entry with its resolved memory footprint. Footprints come from
/// the per-model size hint when present, otherwise from the on-disk artifact
/// size after download (resolved by the provisioning pipeline).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelFootprint {
    pub repo_id: String,
    pub footprint_mb: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SingleDevice,
    Sharded,
    MultiModelPacked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelPlacement {
    pub repo_id: String,
    pub footprint_mb: u64,
    /// Device ordinals this model occupies, ascending.
    pub device_indices: Vec<usize>,
    /// Tensor-parallel degree handed to the runtime. Intra-model
    /// partitioning is the runtime's business, not decided here.
    pub parallelism_degree: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementPlan {
    pub strategy: Strategy,
    /// One placement per catalog entry, in catalog order.
    pub placements: Vec<ModelPlacement>,
}

/// Decide how the catalog maps onto the pool. Pure and deterministic:
/// the same inputs always yield the same plan.
pub fn plan(
    models: &[ModelFootprint],
    pool: &AcceleratorPool,
    policy: &PlacementPolicy,
) -> Result<PlacementPlan, PlacementError> {
    if models.is_empty() {
        return Err(PlacementError::EmptyCatalog);
    }
    if pool.is_empty() {
        return Err(PlacementError::insufficient("no accelerators in pool"));
    }

    let total_footprint: u64 = models.iter().map(|m| m.footprint_mb).sum();
    let total_memory = pool.total_memory_mb();

    match policy.distribution_mode {
        DistributionMode::Auto => {
            if total_footprint <= total_memory && pool.device_count() == 1 {
                Ok(single_device_plan(models))
            } else if total_footprint <= total_memory && models.len() == 1 {
                // Striping only ever applies to a lone model; several models
                // that happen to fit in aggregate still get packed one
                // device each.
                sharded_plan(models, pool, policy, total_footprint)
            } else {
                packed_plan(models, pool, policy)
            }
        }
        DistributionMode::Single => packed_plan(models, pool, policy),
        DistributionMode::Multi => sharded_plan(models, pool, policy, total_footprint),
    }
}

fn single_device_plan(models: &[ModelFootprint]) -> PlacementPlan {
    PlacementPlan {
        strategy: Strategy::SingleDevice,
        placements: models
            .iter()
            .map(|m| ModelPlacement {
                repo_id: m.repo_id.clone(),
                footprint_mb: m.footprint_mb,
                device_indices: vec![0],
                parallelism_degree: 1,
            })
            .collect(),
    }
}

fn sharded_plan(
    models: &[ModelFootprint],
    pool: &AcceleratorPool,
    policy: &PlacementPolicy,
    total_footprint: u64,
) -> Result<PlacementPlan, PlacementError> {
    if total_footprint > pool.total_memory_mb() && !policy.allow_overcommit {
        return Err(PlacementError::insufficient(format!(
            "aggregate footprint {}MB exceeds pool memory {}MB",
            total_footprint,
            pool.total_memory_mb()
        )));
    }

    let degree = pool.device_count() as u32;
    let all_devices: Vec<usize> = (0..pool.device_count()).collect();

    Ok(PlacementPlan {
        strategy: Strategy::Sharded,
        placements: models
            .iter()
            .map(|m| ModelPlacement {
                repo_id: m.repo_id.clone(),
                footprint_mb: m.footprint_mb,
                device_indices: all_devices.clone(),
                parallelism_degree: degree,
            })
            .collect(),
    })
}

/// First-fit-decreasing bin packing, one device per model.
fn packed_plan(
    models: &[ModelFootprint],
    pool: &AcceleratorPool,
    policy: &PlacementPolicy,
) -> Result<PlacementPlan, PlacementError> {
    let max_device_memory = pool
        .per_device_memory_mb
        .iter()
        .copied()
        .max()
        .unwrap_or(0);

    for m in models {
        if m.footprint_mb > max_device_memory {
            return Err(PlacementError::insufficient(format!(
                "model {} footprint {}MB exceeds every device's memory (largest device {}MB)",
                m.repo_id, m.footprint_mb, max_device_memory
            )));
        }
        if m.footprint_mb < policy.min_memory_required_mb {
            return Err(PlacementError::insufficient(format!(
                "model {} footprint {}MB is below the minimum placeable {}MB",
                m.repo_id, m.footprint_mb, policy.min_memory_required_mb
            )));
        }
    }

    // Largest first; stable sort keeps catalog order on ties.
    let mut order: Vec<usize> = (0..models.len()).collect();
    if policy.assignment_mode == AssignmentMode::Balanced {
        order.sort_by(|&a, &b| models[b].footprint_mb.cmp(&models[a].footprint_mb));
    }

    let mut remaining_mb: Vec<i64> = pool
        .per_device_memory_mb
        .iter()
        .map(|&mb| mb as i64)
        .collect();
    let mut resident: Vec<u32> = vec![0; pool.device_count()];
    let mut assigned_device: Vec<Option<usize>> = vec![None; models.len()];

    for (position, &model_idx) in order.iter().enumerate() {
        let m = &models[model_idx];
        let need = m.footprint_mb as i64;

        let device = match policy.assignment_mode {
            AssignmentMode::Manual => {
                let idx = position % pool.device_count();
                check_device(idx, need, &remaining_mb, &resident, policy).map(|_| idx)
            }
            AssignmentMode::Balanced => {
                // Most remaining free memory wins; equal devices are chosen
                // in ascending index order.
                let mut best: Option<(usize, i64)> = None;
                for idx in 0..pool.device_count() {
                    if check_device(idx, need, &remaining_mb, &resident, policy).is_err() {
                        continue;
                    }
                    match best {
                        Some((_, best_free)) if remaining_mb[idx] <= best_free => {}
                        _ => best = Some((idx, remaining_mb[idx])),
                    }
                }
                match best {
                    Some((idx, _)) => Ok(idx),
                    None => Err(no_fit_constraint(m, &remaining_mb, &resident, policy)),
                }
            }
        };

        let device = device.map_err(PlacementError::insufficient)?;
        remaining_mb[device] -= need;
        resident[device] += 1;
        assigned_device[model_idx] = Some(device);
    }

    let placements = models
        .iter()
        .zip(assigned_device)
        .map(|(m, dev)| ModelPlacement {
            repo_id: m.repo_id.clone(),
            footprint_mb: m.footprint_mb,
            // Every model was assigned above or the loop errored out.
            device_indices: vec![dev.unwrap_or(0)],
            parallelism_degree: 1,
        })
        .collect();

    Ok(PlacementPlan {
        strategy: Strategy::MultiModelPacked,
        placements,
    })
}

fn check_device(
    idx: usize,
    need_mb: i64,
    remaining_mb: &[i64],
    resident: &[u32],
    policy: &PlacementPolicy,
) -> Result<(), String> {
    if resident[idx] >= policy.max_models_per_device {
        return Err(format!(
            "device {} already hosts {} models (max_models_per_device={})",
            idx, resident[idx], policy.max_models_per_device
        ));
    }
    if !policy.allow_overcommit {
        if remaining_mb[idx] < need_mb {
            return Err(format!(
                "device {} has {}MB free, {}MB needed (overcommit disabled)",
                idx, remaining_mb[idx], need_mb
            ));
        }
        // Two models each above the placeable minimum never share a device
        // without overcommit. Models below the minimum were rejected above,
        // so any co-location here would violate that.
        if resident[idx] > 0 {
            return Err(format!(
                "device {} already hosts a model and overcommit is disabled",
                idx
            ));
        }
    }
    Ok(())
}

fn no_fit_constraint(
    m: &ModelFootprint,
    remaining_mb: &[i64],
    resident: &[u32],
    policy: &PlacementPolicy,
) -> String {
    let all_capped = resident
        .iter()
        .all(|&r| r >= policy.max_models_per_device);
    if all_capped {
        format!(
            "no device can take {}: every device is at max_models_per_device={}",
            m.repo_id, policy.max_models_per_device
        )
    } else {
        format!(
            "no device has {}MB free for {} (best remaining {}MB, overcommit disabled)",
            m.footprint_mb,
            m.repo_id,
            remaining_mb.iter().copied().max().unwrap_or(0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(repo: &str, mb: u64) -> ModelFootprint {
        ModelFootprint {
            repo_id: repo.to_string(),
            footprint_mb: mb,
        }
    }

    fn pool(devices: &[u64]) -> AcceleratorPool {
        AcceleratorPool::new(devices.to_vec())
    }

    #[test]
    fn fitting_catalog_on_one_device_is_single_device() {
        let plan = plan(
            &[fp("org/a", 8000)],
            &pool(&[24000]),
            &PlacementPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.strategy, Strategy::SingleDevice);
        assert_eq!(plan.placements[0].parallelism_degree, 1);
        assert_eq!(plan.placements[0].device_indices, vec![0]);
    }

    #[test]
    fn fitting_catalog_on_multiple_devices_is_sharded_with_full_degree() {
        let plan = plan(
            &[fp("org/a", 30000)],
            &pool(&[24000, 24000, 24000]),
            &PlacementPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.strategy, Strategy::Sharded);
        assert_eq!(plan.placements[0].parallelism_degree, 3);
        assert_eq!(plan.placements[0].device_indices, vec![0, 1, 2]);
    }

    #[test]
    fn forty_gb_model_on_two_24gb_devices_shards_with_degree_two() {
        let plan = plan(
            &[fp("org/llama-70b", 40000)],
            &pool(&[24000, 24000]),
            &PlacementPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.strategy, Strategy::Sharded);
        assert_eq!(plan.placements[0].parallelism_degree, 2);
    }

    #[test]
    fn oversubscribed_catalog_packs_largest_first() {
        let policy = PlacementPolicy {
            max_models_per_device: 2,
            allow_overcommit: true,
            ..PlacementPolicy::default()
        };
        // 20000 + 18000 + 5000 = 43000 > 24000 + 16000
        let plan = plan(
            &[fp("org/small", 5000), fp("org/big", 20000), fp("org/mid", 18000)],
            &pool(&[24000, 16000]),
            &policy,
        )
        .unwrap();
        assert_eq!(plan.strategy, Strategy::MultiModelPacked);
        // big (20000) -> device 0 (most free), mid (18000) -> device 1,
        // small (5000) -> device 0 (4000 free on 0 vs -2000 on 1).
        assert_eq!(plan.placements[1].device_indices, vec![0]);
        assert_eq!(plan.placements[2].device_indices, vec![1]);
        assert_eq!(plan.placements[0].device_indices, vec![0]);
        for p in &plan.placements {
            assert_eq!(p.parallelism_degree, 1);
        }
    }

    #[test]
    fn packed_devices_never_exceed_capacity_without_overcommit() {
        let policy = PlacementPolicy {
            distribution_mode: DistributionMode::Single,
            max_models_per_device: 4,
            allow_overcommit: false,
            ..PlacementPolicy::default()
        };
        // Each model fits alone; the pool never fits them together.
        let plan = plan(
            &[fp("org/a", 14000), fp("org/b", 12000), fp("org/c", 4000)],
            &pool(&[16000, 12000]),
            &policy,
        )
        .unwrap_err();
        // c (4000) has nowhere to go without overcommit once a and b landed.
        assert!(matches!(plan, PlacementError::InsufficientResources { .. }));

        let plan = super::plan(
            &[fp("org/a", 14000), fp("org/b", 12000)],
            &pool(&[16000, 8000]),
            &policy,
        );
        // a takes device 0; b (12000) fits neither the 2000MB left on 0 nor
        // the 8000MB device — the plan fails instead of overcommitting.
        assert!(plan.is_err());

        let plan = super::plan(
            &[fp("org/a", 14000), fp("org/b", 12000)],
            &pool(&[16000, 12000]),
            &policy,
        )
        .unwrap();
        assert_eq!(plan.strategy, Strategy::MultiModelPacked);
        let mut used = vec![0u64; 2];
        for p in &plan.placements {
            used[p.device_indices[0]] += p.footprint_mb;
        }
        assert!(used[0] <= 16000 && used[1] <= 12000);
    }

    #[test]
    fn model_exceeding_every_device_is_insufficient() {
        // 8000MB exceeds both 6000MB devices; 8000 + 4000 > 12000 total.
        let policy = PlacementPolicy {
            max_models_per_device: 1,
            allow_overcommit: false,
            ..PlacementPolicy::default()
        };
        let err = plan(
            &[fp("org/a", 8000), fp("org/b", 4000)],
            &pool(&[6000, 6000]),
            &policy,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlacementError::InsufficientResources { ref constraint }
                if constraint.contains("exceeds every device")
        ));
    }

    #[test]
    fn max_models_per_device_is_a_hard_cap() {
        let policy = PlacementPolicy {
            max_models_per_device: 1,
            allow_overcommit: true,
            ..PlacementPolicy::default()
        };
        // Each model fits a device on its own; the third has nowhere to go
        // once both devices host one, overcommit notwithstanding.
        let err = plan(
            &[fp("org/a", 20000), fp("org/b", 20000), fp("org/c", 20000)],
            &pool(&[24000, 24000]),
            &policy,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlacementError::InsufficientResources { ref constraint }
                if constraint.contains("max_models_per_device")
        ));
    }

    #[test]
    fn large_models_never_share_a_device_without_overcommit() {
        let policy = PlacementPolicy {
            max_models_per_device: 4,
            allow_overcommit: false,
            ..PlacementPolicy::default()
        };
        // Both fit on device 0 by capacity, but co-location is forbidden.
        let err = plan(
            &[fp("org/a", 20000), fp("org/b", 20000), fp("org/c", 20000)],
            &pool(&[48000]),
            &policy,
        )
        .unwrap_err();
        assert!(matches!(err, PlacementError::InsufficientResources { .. }));
    }

    #[test]
    fn footprint_below_minimum_fails_packing() {
        let policy = PlacementPolicy {
            min_memory_required_mb: 2048,
            ..PlacementPolicy::default()
        };
        let err = plan(
            &[fp("org/tiny", 512), fp("org/big", 24000)],
            &pool(&[20000]),
            &policy,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlacementError::InsufficientResources { ref constraint }
                if constraint.contains("below the minimum")
        ));
    }

    #[test]
    fn plan_is_deterministic() {
        let models = [
            fp("org/a", 9000),
            fp("org/b", 9000),
            fp("org/c", 7000),
            fp("org/d", 5000),
        ];
        let devices = pool(&[12000, 12000, 12000]);
        let policy = PlacementPolicy {
            distribution_mode: DistributionMode::Single,
            max_models_per_device: 2,
            allow_overcommit: true,
            ..PlacementPolicy::default()
        };
        let first = plan(&models, &devices, &policy).unwrap();
        for _ in 0..10 {
            assert_eq!(plan(&models, &devices, &policy).unwrap(), first);
        }
    }

    #[test]
    fn equal_free_memory_prefers_lowest_device_index() {
        // Total would fit the pool, so force the packing path.
        let policy = PlacementPolicy {
            distribution_mode: DistributionMode::Single,
            allow_overcommit: false,
            ..PlacementPolicy::default()
        };
        let plan = plan(
            &[fp("org/a", 10000), fp("org/b", 10000)],
            &pool(&[12000, 12000, 12000]),
            &policy,
        )
        .unwrap();
        assert_eq!(plan.placements[0].device_indices, vec![0]);
        assert_eq!(plan.placements[1].device_indices, vec![1]);
    }

    #[test]
    fn manual_assignment_round_robins_in_catalog_order() {
        let policy = PlacementPolicy {
            distribution_mode: DistributionMode::Single,
            assignment_mode: AssignmentMode::Manual,
            max_models_per_device: 2,
            allow_overcommit: true,
            ..PlacementPolicy::default()
        };
        let plan = plan(
            &[fp("org/a", 4000), fp("org/b", 4000), fp("org/c", 4000)],
            &pool(&[16000, 16000]),
            &policy,
        )
        .unwrap();
        assert_eq!(plan.placements[0].device_indices, vec![0]);
        assert_eq!(plan.placements[1].device_indices, vec![1]);
        assert_eq!(plan.placements[2].device_indices, vec![0]);
    }

    #[test]
    fn multi_mode_forces_sharding() {
        let policy = PlacementPolicy {
            distribution_mode: DistributionMode::Multi,
            ..PlacementPolicy::default()
        };
        let plan = plan(&[fp("org/a", 4000)], &pool(&[24000, 24000]), &policy).unwrap();
        assert_eq!(plan.strategy, Strategy::Sharded);
        assert_eq!(plan.placements[0].parallelism_degree, 2);
    }

    #[test]
    fn empty_catalog_and_empty_pool_fail() {
        assert_eq!(
            plan(&[], &pool(&[24000]), &PlacementPolicy::default()).unwrap_err(),
            PlacementError::EmptyCatalog
        );
        assert!(matches!(
            plan(&[fp("org/a", 1)], &pool(&[]), &PlacementPolicy::default()).unwrap_err(),
            PlacementError::InsufficientResources { .. }
        ));
    }
}
