use rstar::primitives::GeomWithData;
use rstar::RTree;

type ValuedPoint = GeomWithData<[f64; 2], f64>;

/// Nearest-neighbour lookup over known values.
#[derive(Debug, Clone)]
pub struct NearestNeighbour {
    tree: RTree<ValuedPoint>,
}

impl NearestNeighbour {
    pub fn new(points: &[[f64; 2]], values: &[f64]) -> Self {
        let entries = points
            .iter()
            .zip(values)
            .map(|(point, value)| GeomWithData::new(*point, *value))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Value of the closest known point, `None` if there are no points.
    pub fn value_at(&self, at: [f64; 2]) -> Option<f64> {
        self.tree.nearest_neighbor(&at).map(|point| point.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_value() {
        let nearest = NearestNeighbour::new(&[[0.0, 0.0], [10.0, 0.0]], &[1.0, 2.0]);
        assert_eq!(nearest.value_at([2.0, 3.0]), Some(1.0));
        assert_eq!(nearest.value_at([7.0, -1.0]), Some(2.0));
        assert_eq!(NearestNeighbour::new(&[], &[]).value_at([0.0, 0.0]), None);
    }
}
