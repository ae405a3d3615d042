use bytemuck::Pod;

use super::{
    Command, CommandReader, EvaluationState, InstructionRecord, execute::execute_stream,
    execute::ExecutionStats, records,
};
use crate::{
    arena::{FrameArena, FrameBlock, FrameView},
    config::PoseCommandConfig,
    errors::{CommandError, CommandResult, EvaluationResult},
    pose::PoseBuffers,
};

/// Records one character's instruction stream into frame memory.
///
/// The stream has a fixed capacity chosen up front. Appending past it fails with
/// [`CommandError::BufferFull`] and leaves the stream as it was.
pub struct CommandBuilder<'a> {
    arena: &'a mut FrameArena,
    stream: FrameBlock,
    cursor: usize,
    count: usize,
    joint_masks: Vec<FrameBlock>,
    state: EvaluationState,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(
        arena: &'a mut FrameArena,
        state: EvaluationState,
        capacity: usize,
    ) -> CommandResult<Self> {
        let stream = arena.allocate(capacity)?;
        Ok(Self {
            arena,
            stream,
            cursor: 0,
            count: 0,
            joint_masks: Vec::new(),
            state,
        })
    }

    pub fn append<R: InstructionRecord>(&mut self, record: R) -> CommandResult<()> {
        debug_assert_eq!(bytemuck::bytes_of(&record)[0], R::OPCODE as u8);
        self.write(&record)
    }

    pub fn append_command(&mut self, command: Command) -> CommandResult<()> {
        self.write_bytes(command.as_bytes())
    }

    fn write<T: Pod>(&mut self, record: &T) -> CommandResult<()> {
        self.write_bytes(bytemuck::bytes_of(record))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> CommandResult<()> {
        let remaining = self.remaining();
        if bytes.len() > remaining {
            return Err(CommandError::BufferFull {
                needed: bytes.len(),
                remaining,
            });
        }

        let stream = self.arena.bytes_mut(&self.stream)?;
        stream[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        self.count += 1;
        Ok(())
    }

    /// Copies `joints` into frame memory and appends a `JointMask` instruction installing them.
    /// The ids must be sorted ascending and inside the skeleton.
    pub fn push_joint_mask(&mut self, joints: &[u16]) -> CommandResult<u16> {
        let joint_count = self.state.joint_count();
        let mut previous: Option<u16> = None;
        for joint in joints.iter().copied() {
            if joint as usize >= joint_count || previous.is_some_and(|p| p >= joint) {
                return Err(CommandError::InvalidJointMask { joint });
            }
            previous = Some(joint);
        }

        let max = records::JointMask::CLEAR as usize;
        if self.joint_masks.len() >= max {
            return Err(CommandError::TooManyJointMasks { max });
        }
        let slot = self.joint_masks.len() as u16;

        let remaining = self.remaining();
        let needed = size_of::<records::JointMask>();
        if needed > remaining {
            return Err(CommandError::BufferFull { needed, remaining });
        }

        let block = self.arena.allocate_slice(joints)?;
        self.joint_masks.push(block);
        self.append(records::JointMask::install(slot))?;
        Ok(slot)
    }

    /// Appends a `JointMask` instruction that removes the active mask.
    pub fn clear_joint_mask(&mut self) -> CommandResult<()> {
        self.append(records::JointMask::clear())
    }

    pub fn state(&self) -> &EvaluationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EvaluationState {
        &mut self.state
    }

    /// Number of instructions recorded so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn remaining(&self) -> usize {
        self.stream.len() - self.cursor
    }

    /// Seals the recorded stream and its joint masks into an immutable [`CommandBuffer`].
    pub fn finish(self) -> CommandResult<CommandBuffer> {
        let CommandBuilder {
            arena,
            stream,
            cursor,
            count,
            joint_masks,
            mut state,
        } = self;

        for mask in joint_masks.iter() {
            state.register_joint_mask(arena.share(mask)?);
        }

        Ok(CommandBuffer {
            stream: arena.share(&stream)?,
            len: cursor,
            count,
            state,
        })
    }
}

/// A recorded instruction stream together with the state it is evaluated against.
///
/// Command buffers only hold read-only views into frame memory, so they can be moved to a worker
/// thread. The frame arena cannot be reset until every command buffer of the frame is dropped.
#[derive(Debug)]
pub struct CommandBuffer {
    stream: FrameView,
    len: usize,
    count: usize,
    state: EvaluationState,
}

impl CommandBuffer {
    /// Number of instructions in the stream.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.stream.bytes()[..self.len]
    }

    pub fn state(&self) -> &EvaluationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EvaluationState {
        &mut self.state
    }

    pub fn iter(&self) -> CommandReader<'_> {
        CommandReader::new(self.bytes())
    }

    /// Decodes the whole stream. Fails on the first unknown or truncated record.
    pub fn decode_all(&self) -> EvaluationResult<Vec<Command>> {
        self.iter()
            .map(|entry| entry.map(|(_, command)| command))
            .collect()
    }

    /// Interprets the stream in order against `buffers`, which must already be sized for the
    /// skeleton.
    pub fn execute(
        &mut self,
        buffers: &mut PoseBuffers,
        config: &PoseCommandConfig,
    ) -> EvaluationResult<ExecutionStats> {
        let bytes = &self.stream.bytes()[..self.len];
        execute_stream(bytes, &mut self.state, buffers, config)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        blending::test_support::state,
        clip_source::{ClipId, ClipLibrary},
        command::{PerJointBlendMode, SampleFlags},
        config::ArenaConfig,
        errors::ArenaError,
        pose::{BufferSelect, JointFlags, PoseInit},
    };

    fn random_buffer(rng: &mut StdRng) -> BufferSelect {
        if rng.random() {
            BufferSelect::Temporary
        } else {
            BufferSelect::Target
        }
    }

    fn random_command(rng: &mut StdRng) -> Command {
        let clip = ClipId(rng.random_range(0..64));
        let time = rng.random_range(0.0..1.0);
        let weight = rng.random_range(0.0..1.0);
        match rng.random_range(0..12) {
            0 => records::ClearPoseBuffer::new(
                random_buffer(rng),
                PoseInit::Identity,
                JointFlags::from_bits_truncate(rng.random()),
            )
            .into(),
            1 => records::SampleAddAnimFull::new(
                clip,
                time,
                weight,
                SampleFlags::from_bits_truncate(rng.random()),
            )
            .into(),
            2 => records::SampleAddAnimPart::new(clip, time, weight, random_buffer(rng)).into(),
            3 => records::SampleReplaceAnimPart::new(clip, time, weight, random_buffer(rng)).into(),
            4 => records::AddPoseBuffer::new(BufferSelect::Temporary, BufferSelect::Target, weight)
                .into(),
            5 => records::PerJointBlending::new(
                BufferSelect::Temporary,
                BufferSelect::Target,
                PerJointBlendMode::Additive,
            )
            .into(),
            6 => records::NormalizeFull::new(random_buffer(rng)).into(),
            7 => records::ScaleUniformFull::new(random_buffer(rng), rng.random_range(0.5..2.0))
                .into(),
            8 => records::PoseModifier::new(random_buffer(rng), rng.random()).into(),
            9 => records::SampleAddPoseFull::new(clip, weight, SampleFlags::empty()).into(),
            10 => records::SamplePosePart::new(clip, weight, random_buffer(rng)).into(),
            _ => records::VerifyFull::new(random_buffer(rng)).into(),
        }
    }

    #[test]
    fn random_streams_decode_to_what_was_recorded() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut arena = FrameArena::new(&ArenaConfig { bucket_size: 1024 });

        for _ in 0..32 {
            let count = rng.random_range(0..200);
            let commands: Vec<Command> = (0..count).map(|_| random_command(&mut rng)).collect();
            let expected_len: usize = commands.iter().map(|c| c.opcode().record_size()).sum();

            let mut builder =
                CommandBuilder::new(&mut arena, state(ClipLibrary::new()), 4096).unwrap();
            for command in commands.iter() {
                builder.append_command(*command).unwrap();
            }
            let buffer = builder.finish().unwrap();

            assert_eq!(buffer.len(), commands.len());
            assert_eq!(buffer.bytes().len(), expected_len);
            assert_eq!(buffer.decode_all().unwrap(), commands);

            drop(buffer);
            arena.reset().unwrap();
        }
    }

    #[test]
    fn full_stream_rejects_appends() {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(ClipLibrary::new()), 20).unwrap();

        builder
            .append(records::SampleAddAnimFull::new(ClipId(0), 0., 1., SampleFlags::empty()))
            .unwrap();
        assert_eq!(
            builder.append(records::AddPoseBuffer::new(
                BufferSelect::Temporary,
                BufferSelect::Target,
                1.
            )),
            Err(CommandError::BufferFull {
                needed: 8,
                remaining: 4
            })
        );
        builder
            .append(records::NormalizeFull::new(BufferSelect::Target))
            .unwrap();
        assert_eq!(builder.len(), 2);
        assert_eq!(builder.remaining(), 0);
    }

    #[test]
    fn joint_masks_are_shared_with_the_buffer() {
        let mut arena = FrameArena::default();
        let mut builder = CommandBuilder::new(&mut arena, state(ClipLibrary::new()), 64).unwrap();

        assert_eq!(
            builder.push_joint_mask(&[2, 1]),
            Err(CommandError::InvalidJointMask { joint: 1 })
        );
        assert_eq!(builder.push_joint_mask(&[0, 2]), Ok(0));
        assert_eq!(builder.push_joint_mask(&[1]), Ok(1));
        builder.clear_joint_mask().unwrap();

        let mut buffer = builder.finish().unwrap();
        assert_eq!(buffer.state().joint_mask_count(), 2);
        assert!(buffer.state_mut().install_joint_mask(Some(0)));
        assert_eq!(buffer.state().active_joint_mask(), Some(&[0u16, 2][..]));
        assert!(!buffer.state().is_joint_active(1));
        assert!(!buffer.state_mut().install_joint_mask(Some(5)));

        assert_eq!(arena.reset(), Err(ArenaError::BucketInFlight { bucket: 0 }));
        drop(buffer);
        assert!(arena.reset().is_ok());
    }
}
