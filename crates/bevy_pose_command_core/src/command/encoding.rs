use bytemuck::Pod;

use super::records;
use crate::errors::{EvaluationError, EvaluationResult};

/// A record type that can be appended to a command stream.
pub trait InstructionRecord: Pod + Into<Command> {
    const OPCODE: Opcode;
}

/// Declares the instruction set. The opcode enum, the record size table and the decoded
/// [`Command`] enum are all generated from this single list, so they cannot drift apart.
macro_rules! instruction_set {
    ($($opcode:literal => $name:ident),* $(,)?) => {
        /// Leading byte of every encoded instruction.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $opcode,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($opcode => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Encoded size of the record introduced by this opcode, opcode byte included.
            pub const fn record_size(self) -> usize {
                match self {
                    $(Opcode::$name => size_of::<records::$name>(),)*
                }
            }
        }

        $(
            impl InstructionRecord for records::$name {
                const OPCODE: Opcode = Opcode::$name;
            }

            impl From<records::$name> for Command {
                fn from(value: records::$name) -> Self {
                    Command::$name(value)
                }
            }
        )*

        /// A decoded instruction.
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub enum Command {
            $($name(records::$name),)*
        }

        impl Command {
            pub fn opcode(&self) -> Opcode {
                match self {
                    $(Command::$name(_) => Opcode::$name,)*
                }
            }

            pub fn as_bytes(&self) -> &[u8] {
                match self {
                    $(Command::$name(record) => bytemuck::bytes_of(record),)*
                }
            }

            /// `bytes` must be exactly `opcode.record_size()` long.
            fn read(opcode: Opcode, bytes: &[u8]) -> Self {
                match opcode {
                    $(Opcode::$name => Command::$name(bytemuck::pod_read_unaligned(bytes)),)*
                }
            }
        }
    };
}

instruction_set! {
    0x01 => ClearPoseBuffer,
    0x02 => SampleAddAnimFull,
    0x03 => SampleAddAnimPart,
    0x04 => SampleReplaceAnimPart,
    0x05 => AddPoseBuffer,
    0x06 => PerJointBlending,
    0x07 => NormalizeFull,
    0x08 => ScaleUniformFull,
    0x09 => JointMask,
    0x0A => PoseModifier,
    0x0B => SampleAddPoseFull,
    0x0C => SamplePosePart,
    0x0D => VerifyFull,
}

/// Walks an encoded command stream, yielding each instruction with its byte offset.
///
/// An unknown opcode or a record cut short by the end of the stream yields an error and ends the
/// iteration, since the size of anything after it cannot be known.
#[derive(Clone, Debug)]
pub struct CommandReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> CommandReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn read_next(&mut self) -> EvaluationResult<(usize, Command)> {
        let offset = self.offset;
        let byte = self.bytes[offset];
        let opcode = Opcode::from_u8(byte).ok_or(EvaluationError::UnknownOpcode {
            opcode: byte,
            offset,
        })?;
        let record = self
            .bytes
            .get(offset..offset + opcode.record_size())
            .ok_or(EvaluationError::TruncatedRecord { opcode, offset })?;

        self.offset += record.len();
        Ok((offset, Command::read(opcode, record)))
    }
}

impl Iterator for CommandReader<'_> {
    type Item = EvaluationResult<(usize, Command)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }

        let result = self.read_next();
        if result.is_err() {
            self.offset = self.bytes.len();
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clip_source::ClipId,
        pose::{BufferSelect, JointFlags, PoseInit},
    };

    #[test]
    fn opcodes_round_trip_through_bytes() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_u8(*opcode as u8), Some(*opcode));
            assert!(opcode.record_size() >= 4);
        }
        assert_eq!(Opcode::from_u8(0), None);
        assert_eq!(Opcode::from_u8(0xEE), None);
    }

    #[test]
    fn leading_byte_is_the_opcode() {
        let commands: [Command; 3] = [
            records::ClearPoseBuffer::new(
                BufferSelect::Temporary,
                PoseInit::Zero,
                JointFlags::empty(),
            )
            .into(),
            records::SampleAddAnimFull::new(ClipId(9), 0.5, 1., Default::default()).into(),
            records::JointMask::clear().into(),
        ];
        for command in commands {
            let bytes = command.as_bytes();
            assert_eq!(bytes[0], command.opcode() as u8);
            assert_eq!(bytes.len(), command.opcode().record_size());
        }
    }

    #[test]
    fn unknown_opcode_stops_the_reader() {
        let normalize = records::NormalizeFull::new(BufferSelect::Target);
        let mut bytes = bytemuck::bytes_of(&normalize).to_vec();
        bytes.extend_from_slice(&[0xEE, 0, 0, 0]);
        bytes.extend_from_slice(bytemuck::bytes_of(&normalize));

        let mut reader = CommandReader::new(&bytes);
        assert!(matches!(reader.next(), Some(Ok((0, Command::NormalizeFull(_))))));
        assert_eq!(
            reader.next(),
            Some(Err(EvaluationError::UnknownOpcode {
                opcode: 0xEE,
                offset: 4
            }))
        );
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn truncated_record_is_reported() {
        let record = records::ScaleUniformFull::new(BufferSelect::Target, 2.);
        let bytes = &bytemuck::bytes_of(&record)[..5];
        assert_eq!(
            CommandReader::new(bytes).next(),
            Some(Err(EvaluationError::TruncatedRecord {
                opcode: Opcode::ScaleUniformFull,
                offset: 0
            }))
        );
    }
}
