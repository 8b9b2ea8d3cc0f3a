//! Bounded-random discovery of a route leaving a given edge
//!
//! This is a sampling heuristic, not a reachability search: it spends at most
//! a fixed number of path-finding calls and gives up after that.

use log::debug;
use rand::seq::IndexedRandom;
use rand::Rng;

use super::config::{INTERNAL_EDGE_PREFIX, ROUTE_DISCOVERY_TRIALS};
use super::fault::{escalate, ConnectionFault};
use super::session::{ReadCommand, Session};
use super::types::{is_internal_edge, EntityId};

/// Find a route of at least two edges starting at `start`
///
/// Samples up to [`ROUTE_DISCOVERY_TRIALS`] destinations uniformly from the
/// session's edge list. Returns `Ok(None)` when no trial produced a usable
/// path.
pub fn find_reachable_route<S, R>(
    session: &mut S,
    rng: &mut R,
    start: &str,
    vehicle_type: &str,
    exclude_internal: bool,
) -> Result<Option<Vec<EntityId>>, ConnectionFault>
where
    S: Session + ?Sized,
    R: Rng + ?Sized,
{
    find_reachable_route_with(
        session,
        rng,
        start,
        vehicle_type,
        exclude_internal,
        ROUTE_DISCOVERY_TRIALS,
        INTERNAL_EDGE_PREFIX,
    )
}

/// [`find_reachable_route`] with an explicit trial bound and internal-edge prefix
pub fn find_reachable_route_with<S, R>(
    session: &mut S,
    rng: &mut R,
    start: &str,
    vehicle_type: &str,
    exclude_internal: bool,
    trials: usize,
    internal_prefix: char,
) -> Result<Option<Vec<EntityId>>, ConnectionFault>
where
    S: Session + ?Sized,
    R: Rng + ?Sized,
{
    let edges = match escalate(session.execute_read(&ReadCommand::EdgeIds))? {
        Ok(reply) => reply.into_list().unwrap_or_default(),
        Err(err) => {
            debug!("Route discovery from {} could not list edges: {}", start, err);
            return Ok(None);
        }
    };

    if edges.is_empty() {
        return Ok(None);
    }

    for trial in 0..trials {
        let Some(candidate) = edges.choose(rng) else {
            break;
        };

        if candidate == start || (exclude_internal && is_internal_edge(candidate, internal_prefix))
        {
            continue;
        }

        let command = ReadCommand::FindRoute {
            from: start.to_string(),
            to: candidate.clone(),
            vehicle_type: vehicle_type.to_string(),
        };

        match escalate(session.execute_read(&command))? {
            Ok(reply) => {
                if let Some(route) = reply.into_list() {
                    if route.len() >= 2 {
                        debug!(
                            "Route discovery trial {} found {} edges from {} to {}",
                            trial,
                            route.len(),
                            start,
                            candidate
                        );
                        return Ok(Some(route));
                    }
                }
            }
            Err(err) => {
                debug!("No path from {} to {}: {}", start, candidate, err);
            }
        }
    }

    Ok(None)
}
