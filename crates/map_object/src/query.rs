//! Spatial queries used for selection.
//!
//! Both queries walk a caller-supplied collection (the root list or some
//! object's children) in reverse so that later objects, which draw on
//! top, win. Inactive objects and objects on invisible layers are
//! skipped along with their subtrees.

use crate::{MapTree, ObjectId};
use glam::Vec2;
use maproom_core::bounds::Bounds;
use maproom_core::layer::LayerRegistry;

fn queryable(tree: &MapTree, layers: &LayerRegistry, id: ObjectId) -> bool {
    tree.get(id)
        .is_some_and(|object| object.active() && layers.is_visible(object.render_layer()))
}

/// Returns the topmost object whose visual bounds contain `pos`.
///
/// With `search_children` set, an object's children are tried before the
/// object itself, so a foreground child wins over its ancestor.
pub fn find_selectable_at_pos(
    tree: &MapTree,
    layers: &LayerRegistry,
    objects: &[ObjectId],
    pos: Vec2,
    search_children: bool,
) -> Option<ObjectId> {
    for &id in objects.iter().rev() {
        if !queryable(tree, layers, id) {
            continue;
        }

        if search_children {
            if let Some(hit) =
                find_selectable_at_pos(tree, layers, tree.children(id), pos, true)
            {
                return Some(hit);
            }
        }

        if tree.contains_point(id, pos) {
            return Some(id);
        }
    }
    None
}

/// Returns a lazy iterator over the objects whose visual bounds overlap
/// the rectangle from `top_left` to `bottom_right`.
///
/// Matches arrive in selection order: reverse of the collection overall,
/// and with `search_children` set, an object's matching descendants
/// before the object itself. Overlap uses open edge comparisons, so
/// bounds that only touch the query rectangle do not match.
pub fn find_intersecting_selectables<'a>(
    tree: &'a MapTree,
    layers: &'a LayerRegistry,
    objects: &[ObjectId],
    top_left: Vec2,
    bottom_right: Vec2,
    search_children: bool,
) -> IntersectingSelectables<'a> {
    // visiting pops from the back, so pushing in collection order makes
    // the iterator walk the collection in reverse
    let stack = objects.iter().copied().map(Frame::Visit).collect();
    IntersectingSelectables {
        tree,
        layers,
        query: Bounds::new(top_left, bottom_right),
        search_children,
        stack,
    }
}

enum Frame {
    /// Apply the skip rules, then schedule children and the overlap test.
    Visit(ObjectId),
    /// Test the object itself and yield it on overlap.
    Test(ObjectId),
}

/// Iterator returned by [`find_intersecting_selectables`].
pub struct IntersectingSelectables<'a> {
    tree: &'a MapTree,
    layers: &'a LayerRegistry,
    query: Bounds,
    search_children: bool,
    stack: Vec<Frame>,
}

impl Iterator for IntersectingSelectables<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Visit(id) => {
                    if !queryable(self.tree, self.layers, id) {
                        continue;
                    }
                    self.stack.push(Frame::Test(id));
                    if self.search_children {
                        self.stack
                            .extend(self.tree.children(id).iter().copied().map(Frame::Visit));
                    }
                }
                Frame::Test(id) => {
                    if let Some(bounds) = self.tree.visual_bounds(id) {
                        if bounds.intersects(&self.query) {
                            return Some(id);
                        }
                    }
                }
            }
        }
        None
    }
}
