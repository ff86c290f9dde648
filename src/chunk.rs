//! Contains a [Chunk] of [OpCode].

use static_assertions::const_assert_eq;

use crate::value::{Value, ValueArray};
use crate::with_try_from_u8;

with_try_from_u8! {
    /// A one-byte operation code for Blue.
    ///
    /// Operands (where present) are written immediately after the opcode byte: a single `u8` for
    /// constant/local/global indices, a big-endian `u16` for jump and loop offsets.
    #[repr(u8)]
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub enum OpCode {
        Constant,
        Nil,
        True,
        False,
        Pop,
        GetLocal,
        SetLocal,
        GetGlobal,
        DefineGlobal,
        SetGlobal,
        Equal,
        Greater,
        Less,
        Add,
        Subtract,
        Multiply,
        Divide,
        Exponent,
        Not,
        Negate,
        Print,
        Jump,
        JumpIfFalse,
        Loop,
        Return,
    }
}

// Every opcode must fit in the single byte the chunk format (§3/§4.3) reserves for it.
const_assert_eq!(std::mem::size_of::<OpCode>(), 1);

/// A chunk of code, with metadata.
#[derive(Default)]
pub struct Chunk {
    code: Vec<u8>,
    pub constants: ValueArray,
    lines: Vec<LineNumberRun>,
}

/// A valid byte from a chunk. This byte can then be interpreted as required.
#[derive(Clone, Copy)]
pub struct BytecodeEntry<'a> {
    byte: u8,
    provenance: &'a Chunk,
}

/// An [OpCode] that has already been written to the bytestream.
///
/// This opcode can be augmented with an additional one-byte operand.
pub struct WrittenOpcode<'a> {
    line: usize,
    provenance: &'a mut Chunk,
}

/// An entry of run-length encoded line numbers.
/// Every entry signifies that the next `length` bytes have the same line number.
#[derive(Debug, Clone)]
struct LineNumberRun {
    /// The actual line number
    line_number: usize,
    /// How many consecutive bytes share `line_number`
    length: usize,
}

///////////////////////////////////////// Implementation //////////////////////////////////////////

impl Chunk {
    /// Return a new, empty [Chunk].
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Get an entry from the bytecode stream.
    ///
    /// Returns `Some(entry)` when the offset is in `[0, self.len())`.
    pub fn get(&self, offset: usize) -> Option<BytecodeEntry> {
        self.code.get(offset).copied().map(|byte| BytecodeEntry {
            byte,
            provenance: self,
        })
    }

    /// Reads a big-endian 16-bit operand starting at `offset`. Used to decode [OpCode::Jump],
    /// [OpCode::JumpIfFalse], and [OpCode::Loop] operands.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 1` is out of bounds. The compiler never emits a jump instruction
    /// without its two operand bytes, so a well-formed chunk never triggers this.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Append a single [OpCode] to the chunk.
    pub fn write_opcode(&mut self, opcode: OpCode, line: usize) -> WrittenOpcode {
        self.write(opcode as u8, line);

        WrittenOpcode {
            line,
            provenance: self,
        }
    }

    /// Appends `opcode` followed by a two-byte placeholder operand, to be filled in later by
    /// [Chunk::patch_jump]. Returns the offset of the placeholder's first byte.
    pub fn emit_jump(&mut self, opcode: OpCode, line: usize) -> usize {
        self.write(opcode as u8, line);
        self.write(0xff, line);
        self.write(0xff, line);
        self.code.len() - 2
    }

    /// Backpatches the placeholder written by [Chunk::emit_jump] so that it jumps to the current
    /// end of the chunk (i.e. "distance from the byte after the operand to here").
    ///
    /// # Errors
    ///
    /// Returns an error message if the jump distance doesn't fit in a `u16`.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), &'static str> {
        let jump = self.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            return Err("This code body is too large.");
        }

        let [hi, lo] = (jump as u16).to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
        Ok(())
    }

    /// Emits [OpCode::Loop], jumping backward to `loop_start`.
    ///
    /// # Errors
    ///
    /// Returns an error message if the loop body doesn't fit in a `u16` offset.
    pub fn emit_loop(&mut self, loop_start: usize, line: usize) -> Result<(), &'static str> {
        self.write(OpCode::Loop as u8, line);

        let offset = self.code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            return Err("This loop's body is too large.");
        }

        let [hi, lo] = (offset as u16).to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
        Ok(())
    }

    /// Adds a constant to the constant pool, and returns its index.
    ///
    /// Returns `None` (without mutating `self`) when adding the 257th constant or greater, since
    /// the available indices are 0-255.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        self.constants.write(value)
    }

    /// Returns the line number for whatever is at the given offset.
    pub fn line_number_for(&self, offset: usize) -> Option<usize> {
        let mut base_offset = 0;
        for run in self.lines.iter() {
            if (base_offset..base_offset + run.length).contains(&offset) {
                return Some(run.line_number);
            }

            base_offset += run.length;
        }

        None
    }

    /// Returns the length of the byte stream.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if nothing has been appended to the byte stream.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Actually writes to the byte stream.
    fn write(&mut self, payload: u8, line_number: usize) {
        self.code.push(payload);

        // Figure out the line number
        if let Some(run) = self.previous_line_number_run() {
            if run.line_number == line_number {
                run.increment()
            } else {
                // Must create new run
                self.lines.push(LineNumberRun::new(line_number))
            }
        } else {
            assert!(self.lines.is_empty());
            self.lines.push(LineNumberRun::new(line_number))
        }
    }

    /// Return the last line number run
    #[inline(always)]
    fn previous_line_number_run(&mut self) -> Option<&mut LineNumberRun> {
        self.lines.iter_mut().rev().next()
    }
}

impl LineNumberRun {
    fn new(line_number: usize) -> Self {
        Self {
            line_number,
            length: 1,
        }
    }

    fn increment(&mut self) {
        self.length += 1;
    }
}

impl<'a> BytecodeEntry<'a> {
    /// Returns the byte as an index into the constant pool (or as a local-variable slot).
    #[inline(always)]
    pub fn as_constant_index(self) -> usize {
        self.byte as usize
    }

    /// Returns the byte decoded as an [OpCode].
    /// Returns `None` if the byte is not a valid opcode.
    #[inline]
    pub fn as_opcode(self) -> Option<OpCode> {
        self.byte.try_into().ok()
    }

    /// Yanks out a constant from the constant pool.
    #[inline]
    pub fn resolve_constant(self) -> Option<Value> {
        self.provenance.constants.get(self.as_constant_index()).cloned()
    }

    /// Same as [BytecodeEntry::resolve_constant], but returns (index, value).
    #[inline]
    pub fn resolve_constant_with_index(self) -> Option<(usize, Value)> {
        self.resolve_constant()
            .map(|value| (self.as_constant_index(), value))
    }
}

impl<'a> WrittenOpcode<'a> {
    /// Consumes `self` and appends the operand to the byte stream for the last written instruction.
    #[inline]
    pub fn with_operand(self, index: u8) {
        self.provenance.write(index, self.line);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boring_test_of_chunk() {
        let c = Chunk::default();
        assert_eq!(0, c.len());
    }

    #[test]
    fn mess_around_with_bytecode() {
        let mut c = Chunk::new();
        let i = c.add_constant(1.0.into()).unwrap();
        c.write_opcode(OpCode::Constant, 123).with_operand(i);
        c.write_opcode(OpCode::Return, 123);

        assert!(c.len() >= 3);

        // Constant
        assert_eq!(Some(OpCode::Constant), c.get(0).unwrap().as_opcode());
        assert_eq!(Some(0), c.get(1).map(|b| b.as_constant_index()));

        // Return
        assert_eq!(Some(OpCode::Return), c.get(2).unwrap().as_opcode());
    }

    #[test]
    fn line_numbers() {
        let mut c = Chunk::new();

        let idx = c.add_constant(1.2.into()).unwrap();

        // Write a bunch of opcodes on the same line.
        c.write_opcode(OpCode::Constant, 1).with_operand(idx);
        c.write_opcode(OpCode::Constant, 1).with_operand(idx);
        c.write_opcode(OpCode::Constant, 1).with_operand(idx);
        assert_eq!(6, c.len());

        // Write a bunch of opcodes on a different line.
        c.write_opcode(OpCode::Constant, 2).with_operand(idx);
        c.write_opcode(OpCode::Constant, 2).with_operand(idx);
        c.write_opcode(OpCode::Constant, 2).with_operand(idx);
        c.write_opcode(OpCode::Constant, 2).with_operand(idx);
        assert_eq!(14, c.len());

        // Write an opcode on yet a different line
        c.write_opcode(OpCode::Return, 4);
        assert_eq!(15, c.len());

        // Check line numbers.
        assert_eq!(Some(1), c.line_number_for(2));
        assert_eq!(Some(2), c.line_number_for(10));
        assert_eq!(Some(4), c.line_number_for(c.len() - 1));
    }

    #[test]
    fn constant_pool_caps_at_256() {
        let mut c = Chunk::new();
        for i in 0..256 {
            assert_eq!(Some(i as u8), c.add_constant((i as f64).into()));
        }
        assert_eq!(None, c.add_constant(256.0.into()));
    }

    #[test]
    fn jump_patching_round_trips_offset() {
        let mut c = Chunk::new();
        let placeholder = c.emit_jump(OpCode::JumpIfFalse, 1);
        c.write_opcode(OpCode::Pop, 1);
        c.patch_jump(placeholder).unwrap();

        // jump distance should be exactly 1 (one OP_POP byte) from the byte after the operand
        assert_eq!(1, c.read_u16(placeholder));
    }

    #[test]
    fn loop_emits_backward_offset() {
        let mut c = Chunk::new();
        let loop_start = c.len();
        c.write_opcode(OpCode::Pop, 1);
        c.emit_loop(loop_start, 1).unwrap();

        // OP_LOOP + 2-byte operand is 3 bytes; offset measured from after those 3 bytes back to
        // loop_start is (1 Pop byte + 3 Loop bytes) = 4
        let loop_operand_offset = c.len() - 2;
        assert_eq!(4, c.read_u16(loop_operand_offset));
    }
}
