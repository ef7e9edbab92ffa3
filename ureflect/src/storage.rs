//! Byte storage behind a property data block.
//!
//! Fixed-size values live in the root buffer. Strings and container
//! elements live in heap slots owned by the same store; the root buffer (or
//! an element buffer) holds an 8-byte handle of `slot + 1`, `0` meaning empty.

use crate::error::PropertyError;

type Result<T> = std::result::Result<T, PropertyError>;

pub(crate) const HANDLE_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Root,
    Heap(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Addr {
    pub region: Region,
    pub offset: usize,
}

impl Addr {
    pub fn root(offset: usize) -> Self {
        Self {
            region: Region::Root,
            offset,
        }
    }

    pub fn element(slot: usize, offset: usize) -> Self {
        Self {
            region: Region::Heap(slot),
            offset,
        }
    }

    pub fn add(self, delta: usize) -> Self {
        Self {
            region: self.region,
            offset: self.offset + delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HeapValue {
    Free,
    Text(String),
    Elements { bytes: Vec<u8>, count: usize },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ValueStore {
    root: Vec<u8>,
    heap: Vec<HeapValue>,
}

impl ValueStore {
    pub fn with_size(size: usize) -> Self {
        Self {
            root: vec![0; size],
            heap: Vec::new(),
        }
    }

    pub fn root(&self) -> &[u8] {
        &self.root
    }

    fn region(&self, region: Region) -> Result<&[u8]> {
        match region {
            Region::Root => Ok(&self.root),
            Region::Heap(slot) => match self.heap.get(slot) {
                Some(HeapValue::Elements { bytes, .. }) => Ok(bytes),
                _ => Err(PropertyError::DanglingHandle(slot)),
            },
        }
    }

    fn region_mut(&mut self, region: Region) -> Result<&mut [u8]> {
        match region {
            Region::Root => Ok(&mut self.root),
            Region::Heap(slot) => match self.heap.get_mut(slot) {
                Some(HeapValue::Elements { bytes, .. }) => Ok(bytes),
                _ => Err(PropertyError::DanglingHandle(slot)),
            },
        }
    }

    pub fn bytes(&self, addr: Addr, len: usize) -> Result<&[u8]> {
        let region = self.region(addr.region)?;
        let size = region.len();
        region
            .get(addr.offset..addr.offset.saturating_add(len))
            .ok_or(PropertyError::OutOfBounds {
                offset: addr.offset,
                len,
                size,
            })
    }

    pub fn bytes_mut(&mut self, addr: Addr, len: usize) -> Result<&mut [u8]> {
        let region = self.region_mut(addr.region)?;
        let size = region.len();
        region
            .get_mut(addr.offset..addr.offset.saturating_add(len))
            .ok_or(PropertyError::OutOfBounds {
                offset: addr.offset,
                len,
                size,
            })
    }

    pub fn zero(&mut self, addr: Addr, len: usize) -> Result<()> {
        self.bytes_mut(addr, len)?.fill(0);
        Ok(())
    }

    pub fn read<const N: usize>(&self, addr: Addr) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(addr, N)?);
        Ok(out)
    }

    pub fn write(&mut self, addr: Addr, bytes: &[u8]) -> Result<()> {
        self.bytes_mut(addr, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_u32(&self, addr: Addr) -> Result<u32> {
        self.read::<4>(addr).map(u32::from_le_bytes)
    }

    pub fn write_u32(&mut self, addr: Addr, value: u32) -> Result<()> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn read_u64(&self, addr: Addr) -> Result<u64> {
        self.read::<8>(addr).map(u64::from_le_bytes)
    }

    pub fn write_u64(&mut self, addr: Addr, value: u64) -> Result<()> {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn read_handle(&self, addr: Addr) -> Result<Option<usize>> {
        let raw = self.read_u64(addr)?;
        Ok(raw.checked_sub(1).map(|slot| slot as usize))
    }

    pub fn write_handle(&mut self, addr: Addr, slot: Option<usize>) -> Result<()> {
        self.write_u64(addr, slot.map_or(0, |slot| slot as u64 + 1))
    }

    pub fn alloc(&mut self, value: HeapValue) -> usize {
        if let Some(slot) = self
            .heap
            .iter()
            .position(|entry| matches!(entry, HeapValue::Free))
        {
            self.heap[slot] = value;
            slot
        } else {
            self.heap.push(value);
            self.heap.len() - 1
        }
    }

    pub fn free(&mut self, slot: usize) {
        if let Some(entry) = self.heap.get_mut(slot) {
            *entry = HeapValue::Free;
        }
    }

    pub fn heap(&self, slot: usize) -> Result<&HeapValue> {
        match self.heap.get(slot) {
            Some(HeapValue::Free) | None => Err(PropertyError::DanglingHandle(slot)),
            Some(value) => Ok(value),
        }
    }

    pub fn text(&self, slot: usize) -> Result<&str> {
        match self.heap(slot)? {
            HeapValue::Text(text) => Ok(text),
            _ => Err(PropertyError::DanglingHandle(slot)),
        }
    }

    pub fn element_count(&self, slot: usize) -> Result<usize> {
        match self.heap(slot)? {
            HeapValue::Elements { count, .. } => Ok(*count),
            _ => Err(PropertyError::DanglingHandle(slot)),
        }
    }

    pub fn live_slots(&self) -> usize {
        self.heap
            .iter()
            .filter(|entry| !matches!(entry, HeapValue::Free))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accesses_are_bounds_checked() {
        let mut store = ValueStore::with_size(8);
        store.write_u32(Addr::root(4), 7).unwrap();
        assert_eq!(store.read_u32(Addr::root(4)).unwrap(), 7);
        assert_eq!(
            store.read_u32(Addr::root(6)),
            Err(PropertyError::OutOfBounds {
                offset: 6,
                len: 4,
                size: 8
            })
        );
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut store = ValueStore::with_size(16);
        let first = store.alloc(HeapValue::Text("a".into()));
        let second = store.alloc(HeapValue::Elements {
            bytes: vec![0; 4],
            count: 1,
        });
        store.free(first);
        assert_eq!(store.live_slots(), 1);
        assert_eq!(store.alloc(HeapValue::Text("b".into())), first);
        assert_eq!(store.text(first).unwrap(), "b");
        store.write_u32(Addr::element(second, 0), 9).unwrap();
        assert_eq!(store.element_count(second).unwrap(), 1);
        assert!(store.text(second).is_err());
    }
}
