//! # Logic Side
//!
//! Owned by the logic thread. All tracker writes happen here, and every
//! completed tick is published to the render side as an
//! [`InterpolationFrame`].

use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};
use tandem_core::sync::Publisher;
use tandem_core::tracking::{
    BoneId, CameraId, MaterialId, MaterialValue, NodeId, PassId, Pose, Transform, TransformSpace,
    PASS_LAYERS,
};
use tandem_core::{FrameError, FrameResult, InterpolationFrame, Lifecycle, SceneBackend, TrackerSet};

use crate::game_loop::TickDriver;
use crate::module::ModuleHandle;

/// Records dumped per kind by [`LogicSide::dump_buffer_state`].
const DUMP_LIMIT: usize = 16;

/// Logic-thread half of the graphics module.
pub struct LogicSide<B: SceneBackend> {
    handle: ModuleHandle,
    backend: Arc<B>,
    trackers: TrackerSet,
    publisher: Publisher<InterpolationFrame>,
    /// Completed ticks.
    ticks: u64,
    in_tick: bool,
}

impl<B: SceneBackend> LogicSide<B> {
    pub(crate) fn new(
        handle: ModuleHandle,
        backend: Arc<B>,
        trackers: TrackerSet,
        publisher: Publisher<InterpolationFrame>,
    ) -> Self {
        Self { handle, backend, trackers, publisher, ticks: 0, in_tick: false }
    }

    /// Shared handle.
    #[must_use]
    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    /// The scene the trackers read from.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// All five trackers.
    #[must_use]
    pub fn trackers(&self) -> &TrackerSet {
        &self.trackers
    }

    /// Completed logic ticks.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    /// Starts interpolating a node. False if already tracked or missing.
    pub fn add_tracked_node(&mut self, node: NodeId, space: TransformSpace) -> bool {
        self.trackers.nodes.add_tracked(node, space, self.backend.as_ref())
    }

    /// Stops interpolating a node. Call before the scene destroys it.
    pub fn remove_tracked_node(&mut self, node: NodeId) -> bool {
        self.trackers.nodes.remove(node)
    }

    /// Sets the node position for this tick.
    pub fn update_node_position(&mut self, node: NodeId, position: Vec3, space: TransformSpace) {
        self.trackers.nodes.update(node, space, self.backend.as_ref(), |t| t.position = position);
    }

    /// Sets the node orientation for this tick.
    pub fn update_node_orientation(&mut self, node: NodeId, orientation: Quat, space: TransformSpace) {
        self.trackers.nodes.update(node, space, self.backend.as_ref(), |t| {
            t.orientation = orientation.normalize();
        });
    }

    /// Sets the node scale for this tick.
    pub fn update_node_scale(&mut self, node: NodeId, scale: Vec3, space: TransformSpace) {
        self.trackers.nodes.update(node, space, self.backend.as_ref(), |t| t.scale = scale);
    }

    /// Sets the whole node transform for this tick.
    pub fn update_node_transform(&mut self, node: NodeId, transform: Transform, space: TransformSpace) {
        self.trackers.nodes.update(node, space, self.backend.as_ref(), |t| {
            *t = Transform { orientation: transform.orientation.normalize(), ..transform };
        });
    }

    // ---------------------------------------------------------------------
    // Cameras and bones
    // ---------------------------------------------------------------------

    /// Starts interpolating a camera.
    pub fn add_tracked_camera(&mut self, camera: CameraId) -> bool {
        self.trackers.cameras.add_tracked(camera, TransformSpace::Local, self.backend.as_ref())
    }

    /// Stops interpolating a camera.
    pub fn remove_tracked_camera(&mut self, camera: CameraId) -> bool {
        self.trackers.cameras.remove(camera)
    }

    /// Sets the camera position for this tick.
    pub fn update_camera_position(&mut self, camera: CameraId, position: Vec3) {
        self.trackers.cameras.update(camera, TransformSpace::Local, self.backend.as_ref(), |p| {
            p.position = position;
        });
    }

    /// Sets the camera orientation for this tick.
    pub fn update_camera_orientation(&mut self, camera: CameraId, orientation: Quat) {
        self.trackers.cameras.update(camera, TransformSpace::Local, self.backend.as_ref(), |p| {
            p.orientation = orientation.normalize();
        });
    }

    /// Starts interpolating a bone.
    pub fn add_tracked_bone(&mut self, bone: BoneId) -> bool {
        self.trackers.bones.add_tracked(bone, TransformSpace::Local, self.backend.as_ref())
    }

    /// Stops interpolating a bone.
    pub fn remove_tracked_bone(&mut self, bone: BoneId) -> bool {
        self.trackers.bones.remove(bone)
    }

    /// Sets the bone position for this tick.
    pub fn update_bone_position(&mut self, bone: BoneId, position: Vec3) {
        self.trackers.bones.update(bone, TransformSpace::Local, self.backend.as_ref(), |p| {
            p.position = position;
        });
    }

    /// Sets the bone orientation for this tick.
    pub fn update_bone_orientation(&mut self, bone: BoneId, orientation: Quat) {
        self.trackers.bones.update(bone, TransformSpace::Local, self.backend.as_ref(), |p| {
            p.orientation = orientation.normalize();
        });
    }

    /// Sets the full bone pose for this tick.
    pub fn update_bone_pose(&mut self, bone: BoneId, pose: Pose) {
        self.trackers.bones.update(bone, TransformSpace::Local, self.backend.as_ref(), |p| {
            *p = Pose { orientation: pose.orientation.normalize(), ..pose };
        });
    }

    // ---------------------------------------------------------------------
    // Shader passes and materials
    // ---------------------------------------------------------------------

    /// Starts interpolating a shader pass.
    pub fn add_tracked_pass(&mut self, pass: PassId) -> bool {
        self.trackers.passes.add_tracked(pass, TransformSpace::Local, self.backend.as_ref())
    }

    /// Stops interpolating a shader pass.
    pub fn remove_tracked_pass(&mut self, pass: PassId) -> bool {
        self.trackers.passes.remove(pass)
    }

    /// Sets the horizontal scroll speed of one layer for this tick.
    ///
    /// # Errors
    ///
    /// [`FrameError::InvalidLayer`] if `layer` is not below [`PASS_LAYERS`].
    pub fn update_pass_speed_x(&mut self, pass: PassId, layer: usize, speed: f32) -> FrameResult<()> {
        check_layer(layer)?;
        self.trackers.passes.update(pass, TransformSpace::Local, self.backend.as_ref(), |s| s.x[layer] = speed);
        Ok(())
    }

    /// Sets the vertical scroll speed of one layer for this tick.
    ///
    /// # Errors
    ///
    /// [`FrameError::InvalidLayer`] if `layer` is not below [`PASS_LAYERS`].
    pub fn update_pass_speed_y(&mut self, pass: PassId, layer: usize, speed: f32) -> FrameResult<()> {
        check_layer(layer)?;
        self.trackers.passes.update(pass, TransformSpace::Local, self.backend.as_ref(), |s| s.y[layer] = speed);
        Ok(())
    }

    /// Starts interpolating a material block from `initial`.
    pub fn add_tracked_material(&mut self, block: MaterialId, initial: Vec4) -> bool {
        self.trackers.materials.add_seeded(block, MaterialValue { colour: initial }, TransformSpace::Local)
    }

    /// Stops interpolating a material block.
    pub fn remove_tracked_material(&mut self, block: MaterialId) -> bool {
        self.trackers.materials.remove(block)
    }

    /// Moves a material block towards `target` this tick. An untracked block
    /// is first tracked with every slot at `initial`.
    pub fn update_material_value(&mut self, block: MaterialId, initial: Vec4, target: Vec4) {
        let materials = &mut self.trackers.materials;
        if !materials.contains(block) {
            materials.add_seeded(block, MaterialValue { colour: initial }, TransformSpace::Local);
        }
        materials.update(block, TransformSpace::Local, self.backend.as_ref(), |m| m.colour = target);
    }

    // ---------------------------------------------------------------------
    // Tick bracketing
    // ---------------------------------------------------------------------

    /// Opens one fixed tick. Writes made until [`LogicSide::end_logic_frame`]
    /// land in the tick's write slot.
    pub fn begin_logic_frame(&mut self) {
        if self.in_tick {
            tracing::warn!(tick = self.ticks, "begin_logic_frame called twice without end");
        }
        self.in_tick = true;
    }

    /// Closes the tick: advances every ring and publishes the blend pairs of
    /// the two newest completed slots.
    pub fn end_logic_frame(&mut self) {
        if !self.in_tick {
            tracing::debug!(tick = self.ticks, "end_logic_frame without begin");
        }
        self.in_tick = false;
        let report = self.trackers.advance_all(self.backend.as_ref());
        self.ticks += 1;
        if report.seeded > 0 || report.evicted > 0 {
            tracing::trace!(tick = self.ticks, seeded = report.seeded, evicted = report.evicted, "rings advanced");
        }
        self.trackers.collect_into(self.publisher.buffer_mut(), self.ticks);
        self.publisher.publish();
    }

    /// Publishes the blend weight for the render thread.
    pub fn publish_interpolation_alpha(&self, alpha: f32) {
        self.handle.publish_interpolation_alpha(alpha);
    }

    /// Marks a logic frame complete and wakes frame waiters. Returns the id.
    pub fn publish_logic_frame_id(&self) -> u64 {
        self.handle.shared.clock.publish()
    }

    /// Drops every tracked record of every kind and publishes an empty frame,
    /// so the render side stops writing to those objects.
    pub fn clear_scene_resources(&mut self) {
        let records = self.trackers.len();
        self.trackers.clear();
        self.trackers.collect_into(self.publisher.buffer_mut(), self.ticks);
        self.publisher.publish();
        tracing::info!(records, "scene resources cleared");
    }

    /// Logs ring positions and the first records of each kind.
    pub fn dump_buffer_state(&self) {
        tracing::debug!(ticks = self.ticks, records = self.trackers.len(), "logic buffer state");
        self.trackers.dump(DUMP_LIMIT);
    }
}

impl<B: SceneBackend> TickDriver for LogicSide<B> {
    fn begin_logic_frame(&mut self) {
        LogicSide::begin_logic_frame(self);
    }

    fn end_logic_frame(&mut self) {
        LogicSide::end_logic_frame(self);
    }

    fn publish_interpolation_alpha(&mut self, alpha: f32) {
        LogicSide::publish_interpolation_alpha(self, alpha);
    }

    fn publish_logic_frame_id(&mut self) -> u64 {
        LogicSide::publish_logic_frame_id(self)
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.handle.lifecycle()
    }
}

impl<B: SceneBackend> std::fmt::Debug for LogicSide<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicSide")
            .field("ticks", &self.ticks)
            .field("records", &self.trackers.len())
            .finish_non_exhaustive()
    }
}

fn check_layer(layer: usize) -> FrameResult<()> {
    if layer < PASS_LAYERS {
        Ok(())
    } else {
        Err(FrameError::InvalidLayer { index: layer, layers: PASS_LAYERS })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::GraphicsModule;
    use crate::scene::MemoryScene;
    use tandem_core::FrameConfig;

    fn logic() -> (LogicSide<MemoryScene>, Arc<MemoryScene>) {
        let scene = Arc::new(MemoryScene::new());
        let module = GraphicsModule::new(FrameConfig::default(), Arc::clone(&scene)).unwrap();
        (module.into_parts().0, scene)
    }

    #[test]
    fn test_pass_layer_out_of_range() {
        let (mut logic, _scene) = logic();
        assert_eq!(
            logic.update_pass_speed_x(PassId(1), PASS_LAYERS, 1.0),
            Err(FrameError::InvalidLayer { index: PASS_LAYERS, layers: PASS_LAYERS })
        );
        assert!(logic.update_pass_speed_y(PassId(1), PASS_LAYERS - 1, 1.0).is_ok());
        assert!(logic.trackers().passes.contains(PassId(1)));
    }

    #[test]
    fn test_material_update_seeds_from_initial() {
        let (mut logic, _scene) = logic();
        logic.update_material_value(MaterialId(3), Vec4::ZERO, Vec4::ONE);
        let slots = logic.trackers().materials.find_transforms(MaterialId(3)).unwrap();
        let write = logic.trackers().materials.ring().write_index();
        for (slot, value) in slots.iter().enumerate() {
            let expected = if slot == write { Vec4::ONE } else { Vec4::ZERO };
            assert_eq!(value.colour, expected);
        }
    }

    #[test]
    fn test_end_logic_frame_counts_ticks() {
        let (mut logic, scene) = logic();
        scene.nodes.insert(NodeId(1), Transform::IDENTITY);
        assert!(logic.add_tracked_node(NodeId(1), TransformSpace::Local));
        for _ in 0..3 {
            logic.begin_logic_frame();
            logic.update_node_position(NodeId(1), Vec3::X, TransformSpace::Local);
            logic.end_logic_frame();
        }
        assert_eq!(logic.ticks(), 3);
        assert_eq!(logic.trackers().nodes.ring().advances(), 3);
    }

    #[test]
    fn test_clear_scene_resources() {
        let (mut logic, scene) = logic();
        scene.cameras.insert(CameraId(1), Pose::IDENTITY);
        assert!(logic.add_tracked_camera(CameraId(1)));
        logic.add_tracked_material(MaterialId(1), Vec4::ONE);
        logic.clear_scene_resources();
        assert!(logic.trackers().is_empty());
    }
}
