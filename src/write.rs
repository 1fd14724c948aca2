use crate::buffer::Buffer;
use crate::error::Error;
use crate::{MatNumeric, MatType};
use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, trace};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Absolute file offset of the superblock signature. Every address stored
/// inside the HDF5 structures is relative to this; a reader adds it back
/// when following.
pub(crate) const BASE_ADDRESS: u64 = 512;

const PREAMBLE_TEXT_SIZE: usize = 124;
const CREATOR: &str = "APL_MATWRITE";

const SUPERBLOCK_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', 0x0D, 0x0A, 0x1A, 0x0A];
const UNDEFINED_ADDRESS: u64 = 0xFFFF_FFFF_FFFF_FFFF;
const UNDEFINED_SIZE: u32 = 0xFFFF_FFFF;

const OFFSET_SIZE: u8 = 8;
const LENGTH_SIZE: u8 = 8;
const GROUP_LEAF_NODE_K: u16 = 4;
const GROUP_INTERNAL_NODE_K: u16 = 16;

// The fixed region between the superblock and the first dataset header is
// laid out back to back; each offset below is relative to BASE_ADDRESS and
// follows from the structure sizes before it.
const SUPERBLOCK_SIZE: u64 = 56;
const SYMBOL_ENTRY_SIZE: u64 = 40;
const ROOT_HEADER_SIZE: u64 = 40;
const BTREE_PREFIX_SIZE: u64 = 24;
const BTREE_SLOTS: u64 = 1 + 4 * GROUP_INTERNAL_NODE_K as u64;
const BTREE_SIZE: u64 = BTREE_PREFIX_SIZE + 8 * BTREE_SLOTS;
const ROOT_HEADER_OFFSET: u64 = SUPERBLOCK_SIZE + SYMBOL_ENTRY_SIZE;
const BTREE_OFFSET: u64 = ROOT_HEADER_OFFSET + ROOT_HEADER_SIZE;
const HEAP_OFFSET: u64 = BTREE_OFFSET + BTREE_SIZE;
const HEAP_PREFIX_SIZE: u64 = 0x20;
const HEAP_DATA_SIZE: u64 = 0x58;
const SYMBOL_NODE_PREFIX_SIZE: u64 = 8;
const SYMBOL_NODE_ENTRIES: u64 = 2 * GROUP_LEAF_NODE_K as u64;

const MAX_NAME_LENGTH: usize = 255;
const MAX_DIMENSIONS: usize = 255;
// The aligned message size, four body bytes plus the payload, must still
// fit the u16 size field.
const MAX_COMPACT_SIZE: u64 = 0xFFF4;

const MSG_DATASPACE: u16 = 0x01;
const MSG_DATATYPE: u16 = 0x03;
const MSG_FILL_VALUE: u16 = 0x05;
const MSG_DATA_LAYOUT: u16 = 0x08;
const MSG_ATTRIBUTE: u16 = 0x0C;
const MSG_SYMBOL_TABLE: u16 = 0x11;

const CLASS_ATTRIBUTE: &str = "MATLAB_class";

fn align8(n: u64) -> u64 {
    (n + 7) & !7
}

/// The scratch buffer plus the output file, with the absolute offset at
/// which the buffer's first byte will land once flushed.
///
/// Structures whose internal size fields are patched after the fact are
/// assembled in the buffer; everything already flushed is reached with
/// direct file writes, which require the buffer to be empty so the landing
/// offset stays unambiguous.
struct FileWriter {
    file: std::fs::File,
    buf: Buffer,
    offset: u64,
}

impl FileWriter {
    fn create(path: &Path) -> Result<FileWriter, Error> {
        // Read access is needed later to relocate the tail on heap overflow
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(FileWriter {
            file,
            buf: Buffer::new(),
            offset: 0,
        })
    }

    /// Logical file size: everything appended so far.
    fn size(&self) -> u64 {
        self.offset
    }

    /// Appends the buffer contents to the file and returns the absolute
    /// offset they landed at.
    fn flush(&mut self) -> Result<u64, Error> {
        let landing = self.offset;
        self.file.seek(SeekFrom::Start(self.offset))?;
        let written = self.buf.flush(&mut self.file)?;
        self.offset += written as u64;
        Ok(landing)
    }

    fn write_at(&mut self, position: u64, bytes: &[u8]) -> Result<(), Error> {
        debug_assert!(self.buf.is_empty(), "direct file access with a non-empty buffer");
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn patch_u16_at(&mut self, position: u64, value: u16) -> Result<(), Error> {
        debug_assert!(self.buf.is_empty(), "direct file access with a non-empty buffer");
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    fn patch_u64_at(&mut self, position: u64, value: u64) -> Result<(), Error> {
        debug_assert!(self.buf.is_empty(), "direct file access with a non-empty buffer");
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Relocates `[from, end)` forward by `amount`, zero-filling the vacated
    /// range. The whole tail is read before anything is rewritten, so the
    /// overlapping ranges cannot clobber each other.
    fn shift_tail(&mut self, from: u64, amount: u64) -> Result<(), Error> {
        debug_assert!(self.buf.is_empty(), "direct file access with a non-empty buffer");
        let len = (self.offset - from) as usize;
        let mut tail = Vec::new();
        tail.try_reserve_exact(len)?;
        tail.resize(len, 0);
        self.file.seek(SeekFrom::Start(from))?;
        self.file.read_exact(&mut tail)?;
        let mut gap = Vec::new();
        gap.try_reserve_exact(amount as usize)?;
        gap.resize(amount as usize, 0);
        self.file.seek(SeekFrom::Start(from))?;
        self.file.write_all(&gap)?;
        self.file.write_all(&tail)?;
        self.offset += amount;
        Ok(())
    }
}

/// One root-group member per variable.
struct Member {
    /// Name offset relative to the start of the heap data area.
    heap_offset: u64,
    /// Absolute position of this member's slot in the symbol node.
    entry_position: u64,
    /// Base-relative object header position, known once the header flushes.
    header_address: u64,
    element_count: u64,
    element_size: u64,
}

struct RootGroup {
    /// Absolute position of the "TREE" signature.
    btree_address: u64,
    /// Absolute position of the "HEAP" signature.
    heap_begin: u64,
    /// Absolute position immediately past the heap data area.
    heap_end: u64,
    /// Next free byte inside the heap data area.
    heap_cursor: u64,
    members: Vec<Member>,
}

impl RootGroup {
    fn new() -> RootGroup {
        RootGroup {
            btree_address: BASE_ADDRESS + BTREE_OFFSET,
            heap_begin: BASE_ADDRESS + HEAP_OFFSET,
            heap_end: BASE_ADDRESS + HEAP_OFFSET + HEAP_PREFIX_SIZE + HEAP_DATA_SIZE,
            // the first eight data bytes hold the reserved empty name
            heap_cursor: BASE_ADDRESS + HEAP_OFFSET + HEAP_PREFIX_SIZE + 8,
            members: Vec::new(),
        }
    }
}

struct PendingDataset {
    size_field_at: u64,
    body_start: u64,
    has_dims: bool,
    has_data: bool,
}

/// A MAT-file being written.
///
/// Variables go through `begin`, `dims`, `data`, `end` in that order, or
/// through [`MatFile::write_array`] which does all four. Calling the
/// protocol out of order panics; resource and input failures return
/// [`Error`]. Dropping the handle finishes the file on a best-effort
/// basis, `close` does the same and reports the outcome.
pub struct MatFile {
    writer: FileWriter,
    root: RootGroup,
    eof_location_addr: u64,
    pending: Option<PendingDataset>,
    finished: bool,
}

impl MatFile {
    /// Creates `path` and writes the preamble, superblock and the empty
    /// root group structures.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<MatFile, Error> {
        let path = path.as_ref();
        let mut writer = FileWriter::create(path)?;
        emit_preamble(&mut writer.buf)?;
        let eof_location_addr = emit_superblock(&mut writer.buf)?;
        emit_root_symbol_table_entry(&mut writer.buf)?;
        emit_root_object_header(&mut writer.buf)?;
        emit_btree_node(&mut writer.buf)?;
        emit_local_heap(&mut writer.buf)?;
        emit_symbol_node(&mut writer.buf)?;
        writer.flush()?;
        debug!(
            "created {:?}, hdf5 structures start at {:#x}",
            path, BASE_ADDRESS
        );
        Ok(MatFile {
            writer,
            root: RootGroup::new(),
            eof_location_addr,
            pending: None,
            finished: false,
        })
    }

    /// Starts a variable: reserves its name in the local heap and opens an
    /// object header carrying the fill-value, datatype and MATLAB_class
    /// messages.
    pub fn begin(&mut self, name: &str, ty: MatType) -> Result<(), Error> {
        assert!(
            self.pending.is_none(),
            "begin called while a variable is still open"
        );
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong(name.len()));
        }
        if name.as_bytes().contains(&0) {
            return Err(Error::InvalidName);
        }
        if self.root.members.len() as u64 == SYMBOL_NODE_ENTRIES {
            return Err(Error::TooManyVariables);
        }
        trace!("begin variable {:?}, {} byte elements", name, ty.element_size());
        debug_assert!(self.writer.buf.is_empty());

        let needed = name.len() as u64 + 1;
        while needed > self.root.heap_end - self.root.heap_cursor {
            self.expand_heap()?;
        }

        let heap_offset = self.root.heap_cursor - self.root.heap_begin - HEAP_PREFIX_SIZE;
        let mut entry = Vec::new();
        entry.try_reserve_exact(align8(needed) as usize)?;
        entry.extend_from_slice(name.as_bytes());
        entry.resize(align8(needed) as usize, 0);
        self.writer.write_at(self.root.heap_cursor, &entry)?;
        self.root.heap_cursor += entry.len() as u64;

        let entry_position = self.root.heap_end
            + SYMBOL_NODE_PREFIX_SIZE
            + SYMBOL_ENTRY_SIZE * self.root.members.len() as u64;
        self.root.members.push(Member {
            heap_offset,
            entry_position,
            header_address: 0,
            element_count: 1,
            element_size: ty.element_size(),
        });

        let buf = &mut self.writer.buf;
        buf.write_u8(1)?; // object header version
        buf.write_u8(0)?;
        buf.write_u16(5)?; // messages once dims and data are in
        buf.write_u32(1)?; // reference count
        let size_field_at = buf.tell();
        buf.write_u32(UNDEFINED_SIZE)?;
        buf.write_u32(0)?; // pad the prelude to an 8-byte boundary
        let body_start = buf.tell();

        emit_fill_value(buf)?;
        emit_datatype(buf, ty)?;
        emit_class_attribute(buf, ty)?;

        self.pending = Some(PendingDataset {
            size_field_at,
            body_start,
            has_dims: false,
            has_data: false,
        });
        Ok(())
    }

    /// Declares the variable's dimensions. The maximum dimensions written
    /// to the dataspace message equal the current ones.
    pub fn dims(&mut self, dims: &[u64]) -> Result<(), Error> {
        let pending = self
            .pending
            .as_mut()
            .expect("dims called without an open variable");
        assert!(!pending.has_dims, "dims called twice for one variable");
        if dims.len() > MAX_DIMENSIONS {
            return Err(Error::DimensionCountTooLarge(dims.len()));
        }
        let buf = &mut self.writer.buf;
        message(buf, MSG_DATASPACE, (8 + 16 * dims.len()) as u16, 1)?;
        buf.write_u8(1)?; // dataspace version
        buf.write_u8(dims.len() as u8)?;
        buf.write_u8(1)?; // maximum dimensions present
        buf.write(&[0, 0, 0, 0, 0])?;
        for dim in dims {
            buf.write_u64(*dim)?;
        }
        for dim in dims {
            buf.write_u64(*dim)?;
        }
        let member = self
            .root
            .members
            .last_mut()
            .expect("dims called without an open variable");
        member.element_count = dims.iter().fold(1u64, |n, d| n.saturating_mul(*d));
        pending.has_dims = true;
        Ok(())
    }

    /// Supplies the raw element payload, in column-major order, exactly
    /// `element count * element size` bytes.
    ///
    /// Panics if the length does not match the declared dimensions.
    pub fn data(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let pending = self
            .pending
            .as_mut()
            .expect("data called without an open variable");
        assert!(pending.has_dims, "data called before dims");
        assert!(!pending.has_data, "data called twice for one variable");
        let member = self
            .root
            .members
            .last()
            .expect("data called without an open variable");
        let size = member.element_count.saturating_mul(member.element_size);
        if size > MAX_COMPACT_SIZE {
            return Err(Error::DataTooLarge(size));
        }
        assert_eq!(
            bytes.len() as u64,
            size,
            "payload does not match the declared dimensions"
        );
        let buf = &mut self.writer.buf;
        message(buf, MSG_DATA_LAYOUT, align8(4 + size) as u16, 0)?;
        buf.write_u8(3)?; // data layout version
        buf.write_u8(0)?; // compact storage, payload lives in the header
        buf.write_u16(size as u16)?;
        buf.write(bytes)?;
        buf.align_to_8()?;
        pending.has_data = true;
        Ok(())
    }

    /// Seals the variable: patches the header size, flushes the header to
    /// the file and fills in this member's symbol table entry and the
    /// leftmost B-tree slots.
    pub fn end(&mut self) -> Result<(), Error> {
        let pending = self
            .pending
            .take()
            .expect("end called without an open variable");
        assert!(pending.has_data, "end called before data");
        let buf = &mut self.writer.buf;
        buf.seek_end();
        let header_size = buf.tell() - pending.body_start;
        buf.patch_u32(pending.size_field_at, header_size as u32)?;
        let landing = self.writer.flush()?;
        let member = self
            .root
            .members
            .last_mut()
            .expect("end called without an open variable");
        member.header_address = landing - BASE_ADDRESS;
        trace!(
            "variable sealed at base-relative {:#x}, {} header bytes",
            member.header_address,
            header_size
        );
        let entry_position = member.entry_position;
        let heap_offset = member.heap_offset;

        let mut entry = [0u8; SYMBOL_ENTRY_SIZE as usize];
        entry[0..8].copy_from_slice(&heap_offset.to_le_bytes());
        entry[8..16].copy_from_slice(&member.header_address.to_le_bytes());
        // cache type, reserved word and the scratch pad stay zero
        self.writer.write_at(entry_position, &entry)?;

        // leftmost key carries the newest name offset, its child points at
        // the symbol node
        self.writer
            .patch_u64_at(self.root.btree_address + BTREE_PREFIX_SIZE, heap_offset)?;
        self.writer.patch_u64_at(
            self.root.btree_address + BTREE_PREFIX_SIZE + 8,
            self.root.heap_end - BASE_ADDRESS,
        )?;
        Ok(())
    }

    /// Writes a complete variable in one call.
    ///
    /// `values` must be in column-major order, matching MATLAB's memory
    /// layout: a 2x3 matrix {{1,2,3},{4,5,6}} is passed as 1,4,2,5,3,6.
    pub fn write_array<T: MatNumeric>(
        &mut self,
        name: &str,
        dims: &[u64],
        values: &[T],
    ) -> Result<(), Error> {
        self.begin(name, T::mat_type())?;
        self.dims(dims)?;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(values.len() * T::mat_type().element_size() as usize)?;
        for value in values {
            value.extend_le(&mut bytes);
        }
        self.data(&bytes)?;
        self.end()
    }

    /// Finishes the file: flushes, patches the heap size, the symbol count
    /// and the end-of-file mark, and closes the descriptor.
    pub fn close(mut self) -> Result<(), Error> {
        self.finish()
    }

    /// Best-effort close: every patch is attempted in order, the first
    /// failure is reported and the descriptor closes regardless.
    fn finish(&mut self) -> Result<(), Error> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let flushed = if self.writer.buf.is_empty() {
            Ok(())
        } else {
            self.writer.flush().map(|_| ())
        };
        debug!(
            "closing with {} variables, {} bytes",
            self.root.members.len(),
            self.writer.size()
        );
        // data segment size field, past the heap signature and version
        let heap_size = self.writer.patch_u64_at(
            self.root.heap_begin + 8,
            self.root.heap_end - self.root.heap_begin - HEAP_PREFIX_SIZE,
        );
        // symbol count field, past the node signature and version
        let symbols = self
            .writer
            .patch_u16_at(self.root.heap_end + 6, self.root.members.len() as u16);
        let eof = self
            .writer
            .patch_u64_at(self.eof_location_addr, self.writer.size());
        flushed.and(heap_size).and(symbols).and(eof)
    }

    /// Doubles the heap data area by relocating everything past it, then
    /// points the already-written symbol table entries at the shifted
    /// object headers.
    fn expand_heap(&mut self) -> Result<(), Error> {
        let amount = self.root.heap_end - self.root.heap_begin - HEAP_PREFIX_SIZE;
        debug!(
            "heap full, shifting {} trailing bytes forward by {:#x}",
            self.writer.size() - self.root.heap_end,
            amount
        );
        self.writer.shift_tail(self.root.heap_end, amount)?;
        self.root.heap_end += amount;
        for member in &mut self.root.members {
            member.entry_position += amount;
            member.header_address += amount;
            self.writer
                .patch_u64_at(member.entry_position + 8, member.header_address)?;
        }
        Ok(())
    }
}

impl Drop for MatFile {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn message(buf: &mut Buffer, kind: u16, size: u16, flags: u8) -> Result<(), Error> {
    buf.write_u16(kind)?;
    buf.write_u16(size)?;
    buf.write_u8(flags)?;
    buf.write(&[0, 0, 0])
}

fn emit_preamble(buf: &mut Buffer) -> Result<(), Error> {
    let stamp = chrono::Local::now().format("%a %b %d %H:%M:%S %Y");
    let text = format!(
        "MATLAB 7.3 MAT-file, Created by: {}, Created on: {} HDF5 schema 1.00 .",
        CREATOR, stamp
    );
    let mut field = [0u8; PREAMBLE_TEXT_SIZE];
    let bytes = text.as_bytes();
    let len = bytes.len().min(PREAMBLE_TEXT_SIZE);
    field[..len].copy_from_slice(&bytes[..len]);
    buf.write(&field)?;
    buf.write_u16(0x0200)?; // container version
    buf.write_u16(0x4D49)?; // "IM", data is little-endian
    while buf.tell() < BASE_ADDRESS {
        buf.write_u8(0)?;
    }
    Ok(())
}

/// Returns the absolute position of the end-of-file field, patched at close.
fn emit_superblock(buf: &mut Buffer) -> Result<u64, Error> {
    buf.write(&SUPERBLOCK_SIGNATURE)?;
    buf.write_u8(0)?; // superblock version
    buf.write_u8(0)?; // free space storage version
    buf.write_u8(0)?; // root symbol table entry version
    buf.write_u8(0)?;
    buf.write_u8(0)?; // shared header message format version
    buf.write_u8(OFFSET_SIZE)?;
    buf.write_u8(LENGTH_SIZE)?;
    buf.write_u8(0)?;
    buf.write_u16(GROUP_LEAF_NODE_K)?;
    buf.write_u16(GROUP_INTERNAL_NODE_K)?;
    buf.write_u32(0)?; // file consistency flags
    buf.write_u64(BASE_ADDRESS)?;
    buf.write_u64(UNDEFINED_ADDRESS)?; // free space info, never tracked
    let eof_location_addr = buf.tell();
    buf.write_u64(UNDEFINED_ADDRESS)?;
    buf.write_u64(UNDEFINED_ADDRESS)?; // driver information block
    Ok(eof_location_addr)
}

fn emit_root_symbol_table_entry(buf: &mut Buffer) -> Result<(), Error> {
    buf.write_u64(0)?; // link name: the reserved empty string
    buf.write_u64(ROOT_HEADER_OFFSET)?;
    buf.write_u32(1)?; // group addresses cached in the scratch pad
    buf.write_u32(0)?;
    buf.write_u64(BTREE_OFFSET)?;
    buf.write_u64(HEAP_OFFSET)?;
    Ok(())
}

fn emit_root_object_header(buf: &mut Buffer) -> Result<(), Error> {
    buf.write_u8(1)?; // object header version
    buf.write_u8(0)?;
    buf.write_u16(1)?; // just the symbol table message
    buf.write_u32(1)?; // reference count
    buf.write_u32(0x18)?;
    buf.write_u32(0)?; // pad the prelude to an 8-byte boundary
    message(buf, MSG_SYMBOL_TABLE, 0x10, 0)?;
    buf.write_u64(BTREE_OFFSET)?;
    buf.write_u64(HEAP_OFFSET)?;
    Ok(())
}

fn emit_btree_node(buf: &mut Buffer) -> Result<(), Error> {
    buf.write(b"TREE")?;
    buf.write_u8(0)?; // group node
    buf.write_u8(0)?; // leaf level
    buf.write_u16(1)?; // a single entry, never split
    buf.write_u64(UNDEFINED_ADDRESS)?; // left sibling
    buf.write_u64(UNDEFINED_ADDRESS)?; // right sibling
    for _ in 0..BTREE_SLOTS {
        buf.write_u64(0)?;
    }
    Ok(())
}

fn emit_local_heap(buf: &mut Buffer) -> Result<(), Error> {
    buf.write(b"HEAP")?;
    buf.write_u8(0)?; // heap version
    buf.write(&[0, 0, 0])?;
    buf.write_u64(HEAP_DATA_SIZE)?; // patched at close once growth is known
    buf.write_u64(0)?; // free list head
    buf.write_u64(HEAP_OFFSET + HEAP_PREFIX_SIZE)?;
    buf.write(&[0u8; HEAP_DATA_SIZE as usize])?;
    Ok(())
}

fn emit_symbol_node(buf: &mut Buffer) -> Result<(), Error> {
    buf.write(b"SNOD")?;
    buf.write_u8(1)?; // symbol node version
    buf.write_u8(0)?;
    buf.write_u16(0)?; // symbol count, patched at close
    buf.write(&[0u8; (SYMBOL_NODE_ENTRIES * SYMBOL_ENTRY_SIZE) as usize])?;
    Ok(())
}

fn emit_fill_value(buf: &mut Buffer) -> Result<(), Error> {
    message(buf, MSG_FILL_VALUE, 8, 1)?;
    // version 2: early allocation, written when the user defines one,
    // defined, zero-length default
    buf.write_u32(0x0102_0102)?;
    buf.write_u32(0)
}

fn emit_datatype(buf: &mut Buffer, ty: MatType) -> Result<(), Error> {
    message(buf, MSG_DATATYPE, 0x18, 1)?;
    // version 1 floating point class, little-endian, implied mantissa MSB,
    // sign bit location in the upper half of the word
    buf.write_u32(0x11 | 0x2000 | (ty.sign_location() << 16))?;
    buf.write_u32(ty.element_size() as u32)?;
    buf.write_u16(0)?; // bit offset
    buf.write_u16(ty.precision())?;
    buf.write_u8(ty.mantissa_size())?; // exponent sits past the mantissa
    buf.write_u8(ty.exponent_size())?;
    buf.write_u8(0)?; // mantissa location
    buf.write_u8(ty.mantissa_size())?;
    buf.write_u32(ty.exponent_bias())?;
    buf.align_to_8()
}

fn emit_class_attribute(buf: &mut Buffer, ty: MatType) -> Result<(), Error> {
    buf.write_u16(MSG_ATTRIBUTE)?;
    let size_at = buf.tell();
    buf.write_u16(0)?; // patched once the body is written
    buf.write_u8(0)?;
    buf.write(&[0, 0, 0])?;
    let start = buf.tell();
    buf.write_u8(1)?; // attribute message version
    buf.write_u8(0)?;
    buf.write_u16(CLASS_ATTRIBUTE.len() as u16 + 1)?;
    buf.write_u16(8)?; // datatype record size
    buf.write_u16(8)?; // dataspace record size
    buf.write(CLASS_ATTRIBUTE.as_bytes())?;
    buf.write_u8(0)?;
    buf.align_to_8()?;
    // eight byte string datatype sized for the class literal
    buf.write_u32(0x13)?; // version 1, string class, NUL padded
    buf.write_u32(ty.class_name().len() as u32)?;
    // scalar dataspace
    buf.write_u8(1)?;
    buf.write_u8(0)?; // no dimensions
    buf.write_u8(0)?;
    buf.write(&[0, 0, 0, 0, 0])?;
    buf.write(ty.class_name().as_bytes())?;
    buf.align_to_8()?;
    let size = buf.tell() - start;
    buf.patch_u16(size_at, size as u16)
}
