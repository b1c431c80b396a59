use std::collections::BTreeMap;

use tracing::warn;

/// A generating entity's location in the network
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub entity: String,
    pub bus: String,
    pub zone: String,
}

/// Read-only `(entity, bus, zone)` triples
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemTopology {
    placements: Vec<Placement>,
}

impl SystemTopology {
    pub fn new(placements: Vec<Placement>) -> Self {
        Self { placements }
    }

    pub fn with_placement(mut self, entity: &str, bus: &str, zone: &str) -> Self {
        self.placements.push(Placement {
            entity: entity.to_string(),
            bus: bus.to_string(),
            zone: zone.to_string(),
        });
        self
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Map each bus to the zone of the first entity placed on it.
    /// Later entities claiming a different zone are logged and ignored.
    pub fn bus_zone_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for p in &self.placements {
            match map.get(&p.bus) {
                None => {
                    map.insert(p.bus.clone(), p.zone.clone());
                }
                Some(zone) if *zone != p.zone => warn!(
                    bus = %p.bus,
                    kept = %zone,
                    ignored = %p.zone,
                    entity = %p.entity,
                    "Bus assigned to more than one zone"
                ),
                Some(_) => {}
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_assignment_wins() {
        let topology = SystemTopology::default()
            .with_placement("T1", "B1", "SE")
            .with_placement("H1", "B2", "S")
            .with_placement("T2", "B1", "NE");

        let map = topology.bus_zone_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["B1"], "SE");
        assert_eq!(map["B2"], "S");
    }
}
