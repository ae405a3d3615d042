use std::{mem, sync::Arc};

use bevy::{
    log::{error, trace, warn},
    tasks::{AsyncComputeTaskPool, Task, TaskPool, block_on},
};
use bevy_pose_command_core::{
    arena::FrameArena,
    command::{CharacterId, CommandBuffer, CommandBuilder, EvaluationState, ExecutionStats},
    config::PoseCommandConfig,
    errors::{CommandError, EvaluationError},
    ik::{IkTarget, apply_ik},
    pose::{JointTransform, PoseBuffers},
    pose_modifier::{ModifierStage, PoseModifierContext, PoseModifierParams, PoseModifierStack},
    skeleton::SkeletonDefinition,
    space_conversion::relative_to_absolute,
};

use crate::{
    animation::{CharacterAnimation, CharacterRig, build_commands},
    errors::{TaskError, TaskResult},
};

/// Lifecycle of a character's evaluation within a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskState {
    /// Nothing scheduled this frame.
    #[default]
    Idle,
    /// The command buffer is being recorded.
    Building,
    /// The command buffer has been handed to a worker.
    Executing,
    /// The worker finished and its result has been collected.
    Synchronized,
}

/// Per-frame inputs of an evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvaluationRequest {
    pub world: JointTransform,
    pub time_delta: f32,
    pub lod: u8,
    /// Evaluate on the calling thread instead of the async compute pool.
    pub immediate: bool,
}

impl Default for EvaluationRequest {
    fn default() -> Self {
        Self {
            world: JointTransform::IDENTITY,
            time_delta: 0.,
            lod: 0,
            immediate: false,
        }
    }
}

/// Result of an evaluation: the final pose in parent space and in character space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluatedPose {
    pub relative: Vec<JointTransform>,
    pub absolute: Vec<JointTransform>,
    /// World transform of the character root the pose was evaluated with.
    pub world: JointTransform,
    pub stats: ExecutionStats,
}

impl EvaluatedPose {
    /// World space transform of `joint`.
    pub fn world_transform(&self, joint: usize) -> Option<JointTransform> {
        self.absolute.get(joint).map(|absolute| self.world * *absolute)
    }
}

/// Everything a worker needs to evaluate one character, owned so it can cross threads.
struct PoseJob {
    commands: CommandBuffer,
    buffers: PoseBuffers,
    ik_targets: Vec<IkTarget>,
    config: Arc<PoseCommandConfig>,
    pose: EvaluatedPose,
}

struct JobOutput {
    buffers: PoseBuffers,
    pose: EvaluatedPose,
    result: Result<ExecutionStats, EvaluationError>,
}

impl PoseJob {
    fn run(mut self) -> JobOutput {
        let result = self.evaluate();
        JobOutput {
            buffers: self.buffers,
            pose: self.pose,
            result,
        }
    }

    fn evaluate(&mut self) -> Result<ExecutionStats, EvaluationError> {
        let skeleton = self.commands.state().skeleton.clone();
        self.buffers.prepare(skeleton.joint_count());

        let stats = self.commands.execute(&mut self.buffers, &self.config)?;

        let state = self.commands.state();
        let target = &mut self.buffers.target;
        let pose = &mut self.pose;

        relative_to_absolute(&skeleton, target.joints(), &mut pose.absolute);
        if !self.ik_targets.is_empty() {
            apply_ik(
                &skeleton,
                &self.ik_targets,
                target.joints_mut(),
                &mut pose.absolute,
                &self.config.ik,
            );
        }

        let mut after_ik = state.modifiers.slots(ModifierStage::AfterIk).peekable();
        if after_ik.peek().is_some() {
            for slot in after_ik {
                let Some((name, modifier, _)) = state.modifiers.get(slot) else {
                    continue;
                };
                let params = PoseModifierParams {
                    character: state.character,
                    skeleton: &skeleton,
                    pose: &mut *target,
                    time_delta: state.time_delta,
                    world: state.world,
                };
                if let Err(err) = modifier.execute(params) {
                    warn!("{}: pose modifier {name} failed: {err}", state.character);
                }
            }
            relative_to_absolute(&skeleton, target.joints(), &mut pose.absolute);
        }

        pose.relative.clear();
        pose.relative.extend_from_slice(target.joints());
        pose.world = state.world;
        pose.stats = stats;
        Ok(stats)
    }
}

/// What the pose modifiers are synchronized against once the job has been collected.
struct ModifierRendezvous {
    skeleton: Arc<SkeletonDefinition>,
    modifiers: Arc<PoseModifierStack>,
    time_delta: f32,
    world: JointTransform,
}

impl ModifierRendezvous {
    fn new(rig: &CharacterRig, request: &EvaluationRequest) -> Self {
        Self {
            skeleton: rig.skeleton.clone(),
            modifiers: rig.modifiers.clone(),
            time_delta: request.time_delta,
            world: request.world,
        }
    }

    fn context(&self, character: CharacterId) -> PoseModifierContext<'_> {
        PoseModifierContext {
            character,
            skeleton: &self.skeleton,
            time_delta: self.time_delta,
            world: self.world,
        }
    }
}

/// Drives the evaluation of one character across frames.
///
/// A frame goes through [`begin`](Self::begin), [`wait`](Self::wait) and
/// [`finish_frame`](Self::finish_frame). Immediate evaluations are synchronized by `begin`
/// itself. Until the next successful evaluation, the last evaluated pose stays available,
/// including when an evaluation fails.
///
/// Pose modifiers are prepared on the calling thread right before the job is submitted and
/// synchronized on the calling thread once its result has been collected.
pub struct PoseTask {
    character: CharacterId,
    state: TaskState,
    running: Option<Task<JobOutput>>,
    rendezvous: Option<ModifierRendezvous>,
    buffers: Option<PoseBuffers>,
    pose: Option<EvaluatedPose>,
    spare: EvaluatedPose,
    last_error: Option<EvaluationError>,
}

impl PoseTask {
    pub fn new(character: CharacterId) -> Self {
        Self {
            character,
            state: TaskState::Idle,
            running: None,
            rendezvous: None,
            buffers: Some(PoseBuffers::default()),
            pose: None,
            spare: EvaluatedPose::default(),
            last_error: None,
        }
    }

    pub fn character(&self) -> CharacterId {
        self.character
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Records this frame's command buffer into `arena` and starts evaluating it.
    ///
    /// A task left synchronized by the previous frame is finished first. Fails with
    /// [`TaskError::StillExecuting`] while a previous evaluation has not been waited on. With
    /// [`EvaluationRequest::immediate`], the job runs on the calling thread and the task is
    /// [`TaskState::Synchronized`] when this returns.
    pub fn begin(
        &mut self,
        arena: &mut FrameArena,
        rig: &CharacterRig,
        animation: &CharacterAnimation,
        request: EvaluationRequest,
        config: &Arc<PoseCommandConfig>,
    ) -> TaskResult<()> {
        match self.state {
            TaskState::Executing | TaskState::Building => return Err(TaskError::StillExecuting),
            TaskState::Synchronized => self.finish_frame(),
            TaskState::Idle => {}
        }

        self.transition(TaskState::Building);
        let commands = match self.record(arena, rig, animation, request, config) {
            Ok(commands) => commands,
            Err(err) => {
                self.transition(TaskState::Idle);
                return Err(err.into());
            }
        };

        let rendezvous = ModifierRendezvous::new(rig, &request);
        rendezvous
            .modifiers
            .prepare(rendezvous.context(self.character));
        self.rendezvous = Some(rendezvous);

        let job = PoseJob {
            commands,
            buffers: self.buffers.take().unwrap_or_default(),
            ik_targets: animation.ik_targets.clone(),
            config: config.clone(),
            pose: mem::take(&mut self.spare),
        };

        self.transition(TaskState::Executing);
        if request.immediate {
            let output = job.run();
            self.collect(output);
        } else {
            let pool = AsyncComputeTaskPool::get_or_init(TaskPool::default);
            self.running = Some(pool.spawn(async move { job.run() }));
        }
        Ok(())
    }

    fn record(
        &self,
        arena: &mut FrameArena,
        rig: &CharacterRig,
        animation: &CharacterAnimation,
        request: EvaluationRequest,
        config: &PoseCommandConfig,
    ) -> Result<CommandBuffer, CommandError> {
        let state = EvaluationState::new(self.character, rig.skeleton.clone(), rig.clips.clone())
            .with_modifiers(rig.modifiers.clone())
            .with_lod(request.lod)
            .with_time_delta(request.time_delta)
            .with_world(request.world);

        let mut builder = CommandBuilder::new(arena, state, config.command_stream_capacity)?;
        build_commands(&mut builder, animation)?;
        builder.finish()
    }

    /// Whether [`wait`](Self::wait) would return without blocking.
    pub fn is_ready(&self) -> bool {
        self.running.as_ref().is_none_or(Task::is_finished)
    }

    /// Blocks until the running evaluation completes and collects its result.
    pub fn wait(&mut self) {
        if let Some(task) = self.running.take() {
            let output = block_on(task);
            self.collect(output);
        }
    }

    fn collect(&mut self, output: JobOutput) {
        let JobOutput {
            buffers,
            pose,
            result,
        } = output;
        self.buffers = Some(buffers);

        match result {
            Ok(_) => {
                self.last_error = None;
                if let Some(previous) = self.pose.replace(pose) {
                    self.spare = previous;
                }
            }
            Err(err) => {
                error!(
                    "{}: pose evaluation failed, keeping the last pose: {err}",
                    self.character
                );
                self.last_error = Some(err);
                self.spare = pose;
            }
        }

        if let Some(rendezvous) = self.rendezvous.take() {
            rendezvous
                .modifiers
                .synchronize(rendezvous.context(self.character));
        }
        self.transition(TaskState::Synchronized);
    }

    /// Returns the task to [`TaskState::Idle`], waiting for any running evaluation first.
    pub fn finish_frame(&mut self) {
        self.wait();
        self.transition(TaskState::Idle);
    }

    fn transition(&mut self, state: TaskState) {
        if self.state != state {
            trace!("{}: {:?} -> {:?}", self.character, self.state, state);
            self.state = state;
        }
    }

    /// The most recently evaluated pose.
    pub fn pose(&self) -> TaskResult<&EvaluatedPose> {
        match self.state {
            TaskState::Building | TaskState::Executing => Err(TaskError::NotSynchronized),
            TaskState::Idle | TaskState::Synchronized => {
                self.pose.as_ref().ok_or(TaskError::NoPose)
            }
        }
    }

    /// Error of the last evaluation, if it failed.
    pub fn last_error(&self) -> Option<&EvaluationError> {
        self.last_error.as_ref()
    }
}

impl Drop for PoseTask {
    fn drop(&mut self) {
        if let Some(task) = self.running.take() {
            block_on(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bevy::math::{Quat, Vec3};
    use bevy_pose_command_core::{
        clip_source::{AnimationClip, ClipId, ClipLibrary},
        errors::ModifierError,
        pose_modifier::PoseModifier,
        skeleton::JointDefinition,
    };

    use super::*;
    use crate::animation::ActiveAnimation;

    fn rig() -> CharacterRig {
        let skeleton = SkeletonDefinition::new(vec![
            JointDefinition {
                name: "root".into(),
                parent: None,
                bind_pose: JointTransform::IDENTITY,
            },
            JointDefinition {
                name: "tip".into(),
                parent: Some(0),
                bind_pose: JointTransform::from_translation(Vec3::Y),
            },
        ])
        .unwrap();
        let library = ClipLibrary::new().with_clip(
            ClipId(0),
            AnimationClip::new().with_rotation(1, Quat::from_rotation_z(0.5)),
        );
        CharacterRig::new(Arc::new(skeleton), Arc::new(library))
    }

    fn animation() -> CharacterAnimation {
        CharacterAnimation::default().with_base(ActiveAnimation::clip(ClipId(0), 0., 1.))
    }

    fn immediate() -> EvaluationRequest {
        EvaluationRequest {
            immediate: true,
            ..Default::default()
        }
    }

    #[test]
    fn immediate_evaluation_is_synchronized_by_begin() {
        let mut arena = FrameArena::default();
        let config = Arc::new(PoseCommandConfig::default());

        let mut task = PoseTask::new(CharacterId(3));
        assert_eq!(task.pose(), Err(TaskError::NoPose));

        task.begin(&mut arena, &rig(), &animation(), immediate(), &config)
            .unwrap();
        assert_eq!(task.state(), TaskState::Synchronized);
        assert!(task.is_ready());

        let pose = task.pose().unwrap();
        assert_eq!(pose.relative.len(), 2);
        assert!(pose.relative[1].rotation.angle_between(Quat::from_rotation_z(0.5)) < 1e-4);
        assert_eq!(pose.relative[1].translation, Vec3::Y);
        assert!(task.last_error().is_none());

        // nothing left to wait for
        task.wait();
        assert_eq!(task.state(), TaskState::Synchronized);

        task.finish_frame();
        assert_eq!(task.state(), TaskState::Idle);
        assert!(arena.reset().is_ok());
    }

    /// Appends `prepare`, `execute` and `synchronize` calls to a shared log.
    struct Logged {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Logged {
        fn push(&self, step: &str) {
            if let Ok(mut log) = self.log.lock() {
                log.push(format!("{step} {}", self.name));
            }
        }
    }

    impl PoseModifier for Logged {
        fn prepare(&self, _: PoseModifierContext<'_>) -> Result<(), ModifierError> {
            self.push("prepare");
            Ok(())
        }

        fn execute(&self, _: PoseModifierParams<'_>) -> Result<(), ModifierError> {
            self.push("execute");
            Ok(())
        }

        fn synchronize(&self, _: PoseModifierContext<'_>) {
            self.push("synchronize");
        }
    }

    #[test]
    fn modifiers_are_prepared_before_and_synchronized_after_the_job() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let logged = |name| Logged {
            name,
            log: log.clone(),
        };
        let modifiers = PoseModifierStack::new()
            .with("look_at", ModifierStage::BeforeIk, logged("look_at"))
            .with("foot_lock", ModifierStage::AfterIk, logged("foot_lock"));
        let rig = rig().with_modifiers(modifiers);

        let mut arena = FrameArena::default();
        let config = Arc::new(PoseCommandConfig::default());
        let mut task = PoseTask::new(CharacterId(3));

        task.begin(&mut arena, &rig, &animation(), EvaluationRequest::default(), &config)
            .unwrap();
        task.wait();
        assert_eq!(task.state(), TaskState::Synchronized);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "prepare look_at",
                "prepare foot_lock",
                "execute look_at",
                "execute foot_lock",
                "synchronize look_at",
                "synchronize foot_lock",
            ]
        );
    }
}
