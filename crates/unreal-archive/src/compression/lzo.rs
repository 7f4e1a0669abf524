//! LZO1X decoder with bounds checks on every input and output access

use crate::error::{ArchiveError, Result};

const M2_MAX_OFFSET: usize = 0x0800;
const M3_LONG_DISTANCE: usize = 0x4000;

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Instruction byte that may start a literal run
    Literal,
    /// First instruction after a literal run
    AfterLiteral,
    /// Match instruction
    Match(usize),
    /// Short literal tail of the previous match, then a match instruction
    Trailing(usize),
}

struct Decoder<'a, 'b> {
    input: &'a [u8],
    ip: usize,
    output: &'b mut [u8],
    op: usize,
}

fn failure(message: &str) -> ArchiveError {
    ArchiveError::DecompressionFailed(format!("LZO: {message}"))
}

impl Decoder<'_, '_> {
    fn byte(&mut self) -> Result<usize> {
        let byte = *self
            .input
            .get(self.ip)
            .ok_or_else(|| failure("input overrun"))?;
        self.ip += 1;
        Ok(usize::from(byte))
    }

    fn le16(&mut self) -> Result<usize> {
        let low = self.byte()?;
        let high = self.byte()?;
        Ok(low | (high << 8))
    }

    /// Run length continued by zero bytes, each worth 255
    fn long_length(&mut self, base: usize) -> Result<usize> {
        let mut length = base;
        loop {
            match self.byte()? {
                0 => length += 255,
                byte => return Ok(length + byte),
            }
        }
    }

    fn copy_literals(&mut self, count: usize) -> Result<()> {
        let source = self
            .input
            .get(self.ip..self.ip + count)
            .ok_or_else(|| failure("input overrun"))?;
        let target = self
            .output
            .get_mut(self.op..self.op + count)
            .ok_or_else(|| failure("output overrun"))?;
        target.copy_from_slice(source);
        self.ip += count;
        self.op += count;
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, count: usize) -> Result<()> {
        if distance == 0 || distance > self.op {
            return Err(failure("lookbehind overrun"));
        }
        if self.op + count > self.output.len() {
            return Err(failure("output overrun"));
        }
        // Byte-wise copy: source and target overlap for short distances
        let start = self.op - distance;
        for i in 0..count {
            self.output[self.op + i] = self.output[start + i];
        }
        self.op += count;
        Ok(())
    }

    /// Literal count encoded in the low bits of the byte two positions back
    fn after_match(&self) -> Step {
        match self.input[self.ip - 2] & 3 {
            0 => Step::Literal,
            count => Step::Trailing(usize::from(count)),
        }
    }

    fn run(&mut self) -> Result<usize> {
        let mut step = match self.input.first() {
            Some(&first) if first > 17 => {
                self.ip = 1;
                let count = usize::from(first) - 17;
                if count < 4 {
                    Step::Trailing(count)
                } else {
                    self.copy_literals(count)?;
                    Step::AfterLiteral
                }
            }
            _ => Step::Literal,
        };

        loop {
            step = match step {
                Step::Literal => {
                    let t = self.byte()?;
                    if t >= 16 {
                        Step::Match(t)
                    } else {
                        let count = if t == 0 { self.long_length(15)? } else { t };
                        self.copy_literals(count + 3)?;
                        Step::AfterLiteral
                    }
                }
                Step::AfterLiteral => {
                    let t = self.byte()?;
                    if t >= 16 {
                        Step::Match(t)
                    } else {
                        let distance = 1 + M2_MAX_OFFSET + (t >> 2) + (self.byte()? << 2);
                        self.copy_match(distance, 3)?;
                        self.after_match()
                    }
                }
                Step::Match(t) => {
                    if t >= 64 {
                        let distance = 1 + ((t >> 2) & 7) + (self.byte()? << 3);
                        self.copy_match(distance, (t >> 5) + 1)?;
                    } else if t >= 32 {
                        let count = match t & 31 {
                            0 => self.long_length(31)?,
                            count => count,
                        };
                        let distance = 1 + (self.le16()? >> 2);
                        self.copy_match(distance, count + 2)?;
                    } else if t >= 16 {
                        let high = (t & 8) << 11;
                        let count = match t & 7 {
                            0 => self.long_length(7)?,
                            count => count,
                        };
                        let distance = high + (self.le16()? >> 2);
                        if distance == 0 {
                            return self.finish();
                        }
                        self.copy_match(distance + M3_LONG_DISTANCE, count + 2)?;
                    } else {
                        let distance = 1 + (t >> 2) + (self.byte()? << 2);
                        self.copy_match(distance, 2)?;
                    }
                    self.after_match()
                }
                Step::Trailing(count) => {
                    self.copy_literals(count)?;
                    Step::Match(self.byte()?)
                }
            };
        }
    }

    fn finish(&self) -> Result<usize> {
        if self.ip != self.input.len() {
            return Err(failure("input not consumed"));
        }
        Ok(self.op)
    }
}

/// Decompress an LZO1X stream into `output`, returning the produced length
pub fn decompress(input: &[u8], output: &mut [u8]) -> Result<usize> {
    Decoder {
        input,
        ip: 0,
        output,
        op: 0,
    }
    .run()
}
