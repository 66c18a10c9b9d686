//! ControlNet - the in-memory control network.
//!
//! Holds the network header and the ordered list of control points. Points
//! are indexed by id for lookup; insertion order is the persisted order.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

use super::point::ControlPoint;

/// Descriptive header of a network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkHeader {
    pub network_id: String,
    /// Target body name, used to look up radii.
    pub target_name: String,
    pub user_name: String,
    pub created: String,
    pub last_modified: String,
    pub description: String,
}

/// A control network: header plus ordered control points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlNet {
    pub header: NetworkHeader,

    /// Points in persisted order.
    points: Vec<ControlPoint>,

    /// Point id -> index into `points`.
    index: HashMap<String, usize>,
}

impl ControlNet {
    pub fn new(header: NetworkHeader) -> Self {
        Self {
            header,
            points: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Append a point. Point ids are unique within a network.
    pub fn add_point(&mut self, point: ControlPoint) -> Result<()> {
        if self.index.contains_key(&point.id) {
            return Err(CoreError::InvalidState(format!(
                "Control point [{}] already exists in network [{}]",
                point.id, self.header.network_id
            )));
        }
        self.index.insert(point.id.clone(), self.points.len());
        self.points.push(point);
        Ok(())
    }

    pub fn point(&self, id: &str) -> Option<&ControlPoint> {
        self.index.get(id).map(|&i| &self.points[i])
    }

    pub fn point_mut(&mut self, id: &str) -> Option<&mut ControlPoint> {
        match self.index.get(id) {
            Some(&i) => self.points.get_mut(i),
            None => None,
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Mutable access to the points. Ids must not be changed through this.
    pub fn points_mut(&mut self) -> &mut [ControlPoint] {
        &mut self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_valid_points(&self) -> usize {
        self.points.iter().filter(|p| !p.ignore).count()
    }

    pub fn num_measures(&self) -> usize {
        self.points.iter().map(|p| p.num_measures()).sum()
    }

    /// Non-ignored measures of non-ignored points.
    pub fn num_valid_measures(&self) -> usize {
        self.points
            .iter()
            .filter(|p| !p.ignore)
            .map(|p| p.num_valid_measures())
            .sum()
    }

    /// Sorted, unique serial numbers of every observing image.
    pub fn serial_numbers(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .points
            .iter()
            .flat_map(|p| p.measures().iter().map(|m| m.serial_number.as_str()))
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Points with a measure in image `serial_number`.
    pub fn points_in_image(&self, serial_number: &str) -> Vec<&ControlPoint> {
        self.points
            .iter()
            .filter(|p| p.has_serial_number(serial_number))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::measure::ControlMeasure;
    use crate::control::types::{MeasureType, PointType};

    fn small_net() -> ControlNet {
        let mut net = ControlNet::new(NetworkHeader {
            network_id: "Test".into(),
            target_name: "Mars".into(),
            ..Default::default()
        });
        for (id, serials) in [("P1", vec!["B", "A"]), ("P2", vec!["A", "C"])] {
            let mut p = ControlPoint::new(id, PointType::Free);
            for s in serials {
                p.add_measure(ControlMeasure::new(s, MeasureType::Manual)).unwrap();
            }
            net.add_point(p).unwrap();
        }
        net
    }

    #[test]
    fn test_duplicate_point_rejected() {
        let mut net = small_net();
        let err = net.add_point(ControlPoint::new("P1", PointType::Fixed));
        assert!(matches!(err, Err(CoreError::InvalidState(_))));
        assert_eq!(net.num_points(), 2);
        assert_eq!(net.point("P1").unwrap().point_type, PointType::Free);
    }

    #[test]
    fn test_counts_skip_ignored() {
        let mut net = small_net();
        net.point_mut("P2").unwrap().ignore = true;
        net.point_mut("P1").unwrap().measures_mut()[0].ignore = true;
        assert_eq!(net.num_valid_points(), 1);
        assert_eq!(net.num_measures(), 4);
        assert_eq!(net.num_valid_measures(), 1);
    }

    #[test]
    fn test_serial_numbers_and_image_lookup() {
        let net = small_net();
        assert_eq!(net.serial_numbers(), vec!["A", "B", "C"]);
        let ids: Vec<&str> = net.points_in_image("A").iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2"]);
        assert!(net.points_in_image("Z").is_empty());
    }
}
