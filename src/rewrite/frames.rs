//! `StackMapTable` offset shifting.
//!
//! Spliced constructor and initializer bodies keep their original frames. Inserting a straight-line
//! fragment of `by` bytes at offset `at` moves every frame at or after `at` by `by`, and with it
//! every `Uninitialized` entry naming a `new` at or after `at`. Nothing else about the frames
//! changes, since the fragment leaves locals and stack as it found them.

use crate::{
    file::{io::write_be, parser::Parser},
    Result,
};

const SAME_LOCALS_1_STACK_ITEM: u8 = 64;
const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const SAME_FRAME_EXTENDED: u8 = 251;
const FULL_FRAME: u8 = 255;

const ITEM_OBJECT: u8 = 7;
const ITEM_UNINITIALIZED: u8 = 8;

/// One frame with its absolute offset, and its verification types re-encoded.
struct Frame {
    offset: usize,
    kind: FrameKind,
    types: Vec<u8>,
}

#[derive(Clone, Copy)]
enum FrameKind {
    Same,
    SameLocalsOneStack,
    Chop(u8),
    Append(u8),
    Full,
}

/// Shift the frames of a `StackMapTable` body for `by` bytes inserted at offset `at`.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] for truncated tables and reserved frame types,
/// and [`crate::Error::NotSupported`] if a shifted offset no longer fits.
pub fn shift_stack_map(data: &[u8], at: usize, by: usize) -> Result<Vec<u8>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut previous: Option<usize> = None;

    for _ in 0..count {
        let tag = parser.read_be::<u8>()?;
        let (kind, delta) = match tag {
            0..=63 => (FrameKind::Same, u16::from(tag)),
            64..=127 => (
                FrameKind::SameLocalsOneStack,
                u16::from(tag - SAME_LOCALS_1_STACK_ITEM),
            ),
            SAME_LOCALS_1_STACK_ITEM_EXTENDED => {
                (FrameKind::SameLocalsOneStack, parser.read_be::<u16>()?)
            }
            248..=250 => (FrameKind::Chop(SAME_FRAME_EXTENDED - tag), parser.read_be()?),
            SAME_FRAME_EXTENDED => (FrameKind::Same, parser.read_be()?),
            252..=254 => (FrameKind::Append(tag - SAME_FRAME_EXTENDED), parser.read_be()?),
            FULL_FRAME => (FrameKind::Full, parser.read_be()?),
            reserved => return Err(malformed_error!("Reserved frame type {}", reserved)),
        };
        let offset = match previous {
            None => usize::from(delta),
            Some(prior) => prior + usize::from(delta) + 1,
        };
        previous = Some(offset);

        let mut types = Vec::new();
        match kind {
            FrameKind::Same | FrameKind::Chop(_) => {}
            FrameKind::SameLocalsOneStack => copy_types(&mut parser, 1, at, by, &mut types)?,
            FrameKind::Append(n) => copy_types(&mut parser, n.into(), at, by, &mut types)?,
            FrameKind::Full => {
                let locals = parser.read_be::<u16>()?;
                write_be(&mut types, locals);
                copy_types(&mut parser, locals.into(), at, by, &mut types)?;
                let stack = parser.read_be::<u16>()?;
                write_be(&mut types, stack);
                copy_types(&mut parser, stack.into(), at, by, &mut types)?;
            }
        }

        let offset = if offset >= at { offset + by } else { offset };
        frames.push(Frame {
            offset,
            kind,
            types,
        });
    }
    if parser.has_more_data() {
        return Err(malformed_error!("Trailing bytes after stack map frames"));
    }

    let mut out = Vec::with_capacity(data.len() + frames.len());
    write_be(&mut out, count);
    let mut previous: Option<usize> = None;
    for frame in frames {
        let delta = match previous {
            None => frame.offset,
            Some(prior) => frame.offset - prior - 1,
        };
        previous = Some(frame.offset);
        let delta = u16::try_from(delta)
            .map_err(|_| crate::Error::NotSupported(format!("frame delta {delta}")))?;

        match frame.kind {
            FrameKind::Same if delta < 64 => write_be(&mut out, delta as u8),
            FrameKind::Same => {
                write_be(&mut out, SAME_FRAME_EXTENDED);
                write_be(&mut out, delta);
            }
            FrameKind::SameLocalsOneStack if delta < 64 => {
                write_be(&mut out, SAME_LOCALS_1_STACK_ITEM + delta as u8);
            }
            FrameKind::SameLocalsOneStack => {
                write_be(&mut out, SAME_LOCALS_1_STACK_ITEM_EXTENDED);
                write_be(&mut out, delta);
            }
            FrameKind::Chop(n) => {
                write_be(&mut out, SAME_FRAME_EXTENDED - n);
                write_be(&mut out, delta);
            }
            FrameKind::Append(n) => {
                write_be(&mut out, SAME_FRAME_EXTENDED + n);
                write_be(&mut out, delta);
            }
            FrameKind::Full => {
                write_be(&mut out, FULL_FRAME);
                write_be(&mut out, delta);
            }
        }
        out.extend_from_slice(&frame.types);
    }
    Ok(out)
}

fn copy_types(
    parser: &mut Parser,
    count: usize,
    at: usize,
    by: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    for _ in 0..count {
        let tag = parser.read_be::<u8>()?;
        write_be(out, tag);
        match tag {
            ITEM_OBJECT => write_be(out, parser.read_be::<u16>()?),
            ITEM_UNINITIALIZED => {
                let offset = usize::from(parser.read_be::<u16>()?);
                let offset = if offset >= at { offset + by } else { offset };
                let offset = u16::try_from(offset).map_err(|_| {
                    crate::Error::NotSupported(format!("uninitialized offset {offset}"))
                })?;
                write_be(out, offset);
            }
            0..=6 => {}
            other => return Err(malformed_error!("Unknown verification type {}", other)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_after_the_insertion_move() -> Result<()> {
        // same_frame at 5, same_locals_1_stack_item(Integer) at 10, full frame at 20
        let table = [
            0, 3, //
            5, //
            64 + 4, 1, //
            255, 0, 9, 0, 1, 8, 0, 12, 0, 0,
        ];
        let shifted = shift_stack_map(&table, 8, 60)?;
        assert_eq!(
            shifted,
            vec![
                0, 3, //
                5, //
                SAME_LOCALS_1_STACK_ITEM_EXTENDED, 0, 64, 1, //
                255, 0, 9, 0, 1, 8, 0, 72, 0, 0,
            ]
        );
        Ok(())
    }

    #[test]
    fn frames_before_the_insertion_stay() -> Result<()> {
        let table = [0, 2, 3, 4];
        assert_eq!(shift_stack_map(&table, 100, 8)?, table.to_vec());
        let shifted = shift_stack_map(&table, 0, 8)?;
        assert_eq!(shifted, vec![0, 2, 11, 4]);
        Ok(())
    }

    #[test]
    fn reserved_and_truncated_tables_fail() {
        assert!(shift_stack_map(&[0, 1, 200], 0, 4).is_err());
        assert!(shift_stack_map(&[0, 1, 255, 0], 0, 4).is_err());
    }
}
