//! Connection service - derives the dependency graph
//!
//! Shelter, food and hospital sites each need one power and one water
//! connection. Each requirement is served by the nearest facility of that
//! type within the distance cap; the first candidate wins a tie. Power and
//! water sites need nothing.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::db::{dependencies, facilities, DependencyRow, FacilityDb, FacilityQuery};
use crate::error::StorageError;
use crate::geo::haversine_km;
use crate::model::{DependencyType, Facility};

use super::events::{EngineEvent, EventBus};

/// Plan edges for a facility set without touching storage.
///
/// Output order follows input order, power before water for each dependent.
pub fn plan_connections(all: &[Facility], cap_km: f64) -> Vec<DependencyRow> {
    let mut edges = Vec::new();
    let mut linked: HashSet<(String, String)> = HashSet::new();

    for dependent in all {
        for required in dependent.facility_type.required_providers() {
            let mut nearest: Option<(&Facility, f64)> = None;

            for candidate in all.iter().filter(|c| c.facility_type == *required && c.id != dependent.id) {
                let distance = haversine_km(&dependent.location, &candidate.location);
                if distance > cap_km {
                    continue;
                }
                match nearest {
                    Some((_, best)) if distance >= best => {}
                    _ => nearest = Some((candidate, distance)),
                }
            }

            let Some((provider, distance)) = nearest else {
                debug!(
                    dependent = %dependent.id,
                    required = %required,
                    cap_km,
                    "No provider within cap"
                );
                continue;
            };

            let forward = (dependent.id.clone(), provider.id.clone());
            let reverse = (provider.id.clone(), dependent.id.clone());
            if linked.contains(&forward) || linked.contains(&reverse) {
                continue;
            }
            linked.insert(forward);

            edges.push(DependencyRow {
                dependent_id: dependent.id.clone(),
                provider_id: provider.id.clone(),
                dependency_type: DependencyType::for_provider(*required),
                distance_km: Some(distance),
            });
        }
    }

    edges
}

/// Connection service for dependency graph operations
pub struct ConnectionService {
    cap_km: f64,
    events: Arc<EventBus>,
}

impl ConnectionService {
    pub fn new(cap_km: f64, events: Arc<EventBus>) -> Self {
        Self { cap_km, events }
    }

    /// Replace every edge in the store with a freshly planned set.
    ///
    /// Clearing and re-inserting happen in one transaction so readers never
    /// see a half-built graph.
    pub fn rebuild(&self, db: &FacilityDb) -> Result<Vec<DependencyRow>, StorageError> {
        let all = db.read(|conn| facilities::list_facilities(conn, &FacilityQuery::all()))?;
        let planned = plan_connections(&all, self.cap_km);

        let written = db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            dependencies::delete_all_dependencies(&tx)?;
            let mut written = Vec::with_capacity(planned.len());
            for edge in &planned {
                if dependencies::insert_dependency(&tx, edge)? {
                    written.push(edge.clone());
                }
            }
            tx.commit()?;
            Ok(written)
        })?;

        info!(store = %db.kind(), edges = written.len(), facilities = all.len(), "Connections rebuilt");
        self.events.emit(EngineEvent::ConnectionsRebuilt {
            store: db.kind(),
            count: written.len(),
        });

        Ok(written)
    }

    pub fn list(&self, db: &FacilityDb) -> Result<Vec<DependencyRow>, StorageError> {
        db.read(dependencies::list_dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, FacilityType};

    fn at(id: &str, facility_type: FacilityType, lat: f64, lng: f64) -> Facility {
        Facility::new(id, id, facility_type, Coordinate::new(lat, lng))
    }

    #[test]
    fn test_nearest_provider_of_each_type() {
        let all = vec![
            at("s", FacilityType::Shelter, 15.49, 32.49),
            at("w_far", FacilityType::Water, 15.90, 32.90),
            at("w", FacilityType::Water, 15.50, 32.50),
            at("p", FacilityType::Power, 15.52, 32.52),
        ];
        let edges = plan_connections(&all, 200.0);

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].provider_id, "p");
        assert_eq!(edges[0].dependency_type, DependencyType::Power);
        assert_eq!(edges[1].provider_id, "w");
        assert_eq!(edges[1].dependency_type, DependencyType::Water);
        assert!(edges.iter().all(|e| e.dependent_id == "s"));
    }

    #[test]
    fn test_no_edge_beyond_cap() {
        let all = vec![
            at("s", FacilityType::Shelter, 15.5, 32.5),
            at("p", FacilityType::Power, 15.6, 32.5),
            // roughly 330 km north
            at("w", FacilityType::Water, 18.5, 32.5),
        ];
        let edges = plan_connections(&all, 200.0);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dependency_type, DependencyType::Power);
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let all = vec![
            at("h", FacilityType::Hospital, 15.5, 32.5),
            at("p1", FacilityType::Power, 15.6, 32.5),
            at("p2", FacilityType::Power, 15.6, 32.5),
        ];
        let edges = plan_connections(&all, 200.0);
        assert_eq!(edges[0].provider_id, "p1");
    }

    #[test]
    fn test_providers_have_no_edges() {
        let all = vec![
            at("w", FacilityType::Water, 15.5, 32.5),
            at("p", FacilityType::Power, 15.5, 32.6),
            at("x", FacilityType::Other, 15.5, 32.7),
        ];
        assert!(plan_connections(&all, 200.0).is_empty());
    }

    #[test]
    fn test_rebuild_replaces_edges() {
        let db = FacilityDb::open_in_memory(crate::db::StoreKind::Online).unwrap();
        let all = vec![
            at("s", FacilityType::Shelter, 15.49, 32.49),
            at("w", FacilityType::Water, 15.50, 32.50),
            at("p", FacilityType::Power, 15.52, 32.52),
        ];
        db.with_conn(|conn| {
            for f in &all {
                facilities::upsert_facility(conn, f)?;
            }
            Ok(())
        })
        .unwrap();

        let service = ConnectionService::new(200.0, Arc::new(EventBus::new()));
        assert_eq!(service.rebuild(&db).unwrap().len(), 2);
        assert_eq!(service.rebuild(&db).unwrap().len(), 2);
        assert_eq!(service.list(&db).unwrap().len(), 2);
    }
}
