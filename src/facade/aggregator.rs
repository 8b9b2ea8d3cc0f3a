//! Per-edge traffic statistics
//!
//! Statistics are recomputed from the full vehicle roster on every call.
//! Nothing is cached, so there is nothing to invalidate.

use std::collections::HashMap;

use super::types::{EdgeStats, EntityId, VehicleSample};

/// Compute vehicle counts and average speeds for every known edge
///
/// # Arguments
/// * `edge_ids` - The edges to report on; each gets an entry even when empty
/// * `vehicles` - The live vehicles with their current edge and speed
///
/// Vehicles whose edge is not in `edge_ids` (junction-internal segments) are
/// not attributed to any edge.
pub fn compute_edge_stats(
    edge_ids: &[EntityId],
    vehicles: &[VehicleSample],
) -> HashMap<EntityId, EdgeStats> {
    let mut totals: HashMap<&str, (usize, f64)> = edge_ids
        .iter()
        .map(|edge_id| (edge_id.as_str(), (0, 0.0)))
        .collect();

    for vehicle in vehicles {
        if let Some((count, speed_sum)) = totals.get_mut(vehicle.edge.as_str()) {
            *count += 1;
            *speed_sum += vehicle.speed;
        }
    }

    totals
        .into_iter()
        .map(|(edge_id, (count, speed_sum))| {
            let stats = if count == 0 {
                EdgeStats::empty()
            } else {
                EdgeStats {
                    vehicle_count: count,
                    average_speed: speed_sum / count as f64,
                }
            };
            (edge_id.to_string(), stats)
        })
        .collect()
}
