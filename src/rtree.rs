use crate::util::*;
use rstar::{primitives::Rectangle, RTree, AABB};

/// Thin wrapper over an `rstar` rectangle tree used for obstacle footprints
/// and post-legalization overlap checks.
#[derive(Default, Debug, Clone)]
pub struct Rtree {
    tree: RTree<Rectangle<[float; 2]>>,
}

impl Rtree {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn from<T>(points: T) -> Self
    where
        T: IntoIterator<Item = [[float; 2]; 2]>,
    {
        let mut tree = Self::new();
        tree.bulk_insert(points);
        tree
    }

    fn bulk_insert<T>(&mut self, a: T)
    where
        T: IntoIterator<Item = [[float; 2]; 2]>,
    {
        self.tree = RTree::bulk_load(
            a.into_iter()
                .map(|x| Rectangle::from_corners(x[0], x[1]))
                .collect(),
        );
    }

    pub fn insert_bbox(&mut self, a: [[float; 2]; 2]) {
        self.tree.insert(Rectangle::from_corners(a[0], a[1]));
    }

    pub fn count_bbox(&self, a: [[float; 2]; 2]) -> usize {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_corners(a[0], a[1]))
            .count()
    }

    pub fn intersection_bbox(&self, a: [[float; 2]; 2]) -> Vec<[[float; 2]; 2]> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_corners(a[0], a[1]))
            .map(|x| [x.lower(), x.upper()])
            .collect()
    }

    pub fn size(&self) -> usize {
        self.tree.size()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rectangle<[float; 2]>> {
        self.tree.iter()
    }
}

impl fmt::Display for Rtree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for point in self.tree.iter() {
            writeln!(f, "[{:?} {:?}]", point.lower(), point.upper())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_queries_find_intersecting_rectangles() {
        let tree = Rtree::from([
            [[0.0, 0.0], [100.0, 100.0]],
            [[200.0, 0.0], [300.0, 100.0]],
        ]);
        assert_eq!(tree.size(), 2);
        assert_eq!(tree.count_bbox([[50.0, 50.0], [60.0, 60.0]]), 1);
        assert_eq!(tree.count_bbox([[120.0, 0.0], [180.0, 100.0]]), 0);

        let hits = tree.intersection_bbox([[90.0, 0.0], [210.0, 100.0]]);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn incremental_insertion() {
        let mut tree = Rtree::new();
        tree.insert_bbox([[0.0, 0.0], [10.0, 10.0]]);
        assert_eq!(tree.count_bbox([[5.0, 5.0], [6.0, 6.0]]), 1);
    }
}
