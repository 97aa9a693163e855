use foundation::bounds::LatLng;
use foundation::math::precision::stable_total_cmp_f64;

use crate::dataset::Dataset;
use crate::query::FilteredView;

/// A 2-d tree over (lat, lng) coordinates for single nearest-neighbour
/// queries.
///
/// Distance contract:
/// - Squared euclidean distance in degree space (`LatLng::distance_sq`), the
///   same metric at build and query time. No great-circle correction.
///
/// Ordering contract:
/// - When several items are at the same distance, the lowest `index` wins.
///
/// The tree is immutable: a changed point set means a fresh `build`.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    nodes: Vec<Node>,
    len: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        items: Vec<Item>,
    },
    Internal {
        axis: usize,
        split: f64,
        left: usize,
        right: usize,
    },
}

/// A coordinate tagged with its dataset index.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Item {
    pub index: usize,
    pub coord: LatLng,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Nearest {
    pub index: usize,
    pub coord: LatLng,
    pub distance_sq: f64,
}

impl KdTree {
    pub fn build(items: Vec<Item>) -> Self {
        let mut nodes = Vec::new();
        let mut items = items;
        let len = items.len();
        if !items.is_empty() {
            // Root is always node 0.
            build_node(&mut nodes, &mut items);
        }
        Self { nodes, len }
    }

    /// Index every point of `view`.
    pub fn from_view(dataset: &Dataset, view: &FilteredView) -> Self {
        let items = view
            .points(dataset)
            .map(|(index, p)| Item {
                index,
                coord: p.lat_lng(),
            })
            .collect();
        Self::build(items)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Closest item to `query`, or `None` for an empty tree.
    pub fn nearest(&self, query: LatLng) -> Option<Nearest> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<Nearest> = None;
        self.search(0, query, &mut best);
        best
    }

    fn search(&self, idx: usize, query: LatLng, best: &mut Option<Nearest>) {
        match &self.nodes[idx] {
            Node::Leaf { items } => {
                for item in items {
                    let d2 = query.distance_sq(item.coord);
                    if is_better(d2, item.index, best.as_ref()) {
                        *best = Some(Nearest {
                            index: item.index,
                            coord: item.coord,
                            distance_sq: d2,
                        });
                    }
                }
            }
            Node::Internal {
                axis,
                split,
                left,
                right,
            } => {
                let diff = axis_value(query, *axis) - split;
                let (near, far) = if diff < 0.0 {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                self.search(near, query, best);
                // Equal distances still descend so the index tie-break holds.
                if best.is_none_or(|b| diff * diff <= b.distance_sq) {
                    self.search(far, query, best);
                }
            }
        }
    }
}

fn is_better(d2: f64, index: usize, best: Option<&Nearest>) -> bool {
    match best {
        None => true,
        Some(b) => stable_total_cmp_f64(d2, b.distance_sq)
            .then_with(|| index.cmp(&b.index))
            .is_lt(),
    }
}

const LEAF_MAX: usize = 8;

fn build_node(nodes: &mut Vec<Node>, items: &mut [Item]) -> usize {
    if items.len() <= LEAF_MAX {
        let idx = nodes.len();
        nodes.push(Node::Leaf {
            items: items.to_vec(),
        });
        return idx;
    }

    let axis = split_axis(items);
    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| {
        stable_total_cmp_f64(axis_value(a.coord, axis), axis_value(b.coord, axis))
            .then_with(|| a.index.cmp(&b.index))
    });
    let split = axis_value(items[mid].coord, axis);
    let (left_items, right_items) = items.split_at_mut(mid);

    let idx = nodes.len();
    // Placeholder; will patch after children are built.
    nodes.push(Node::Leaf { items: Vec::new() });

    let left = build_node(nodes, left_items);
    let right = build_node(nodes, right_items);

    nodes[idx] = Node::Internal {
        axis,
        split,
        left,
        right,
    };
    idx
}

fn axis_value(p: LatLng, axis: usize) -> f64 {
    if axis == 0 { p.lat } else { p.lng }
}

/// Split along the wider extent; ties prefer latitude.
fn split_axis(items: &[Item]) -> usize {
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    for item in items {
        for axis in 0..2 {
            let v = axis_value(item.coord, axis);
            min[axis] = min[axis].min(v);
            max[axis] = max[axis].max(v);
        }
    }
    if max[0] - min[0] >= max[1] - min[1] { 0 } else { 1 }
}
