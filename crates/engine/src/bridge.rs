//! Typed adapters over the page-level readers and writers.
//!
//! The engine itself never interprets record bytes; task code wraps the raw
//! cursors and writers it gets from the contexts in these adapters together
//! with a serde describing its value shape.

use grist_buffer::{InputCursor, PageReader, PageWriter};
use grist_core::EngineError;

/// Encodes and decodes one value type. Values written through a keyed port
/// must be self-delimiting, since group members are concatenated on the
/// gather side; keys need not be, their boundary comes from the key table.
pub trait ValueSerde {
    type Value;

    fn write_value(&self, value: &Self::Value, writer: &mut PageWriter);
    fn read_value(&self, reader: &mut PageReader) -> Self::Value;
}

/// Adds a key codec for keyed ports.
pub trait KeyValueSerde: ValueSerde {
    type Key;

    fn write_key(&self, key: &Self::Key, writer: &mut PageWriter);
    fn read_key(&self, reader: &mut PageReader) -> Self::Key;
}

/// Writes plain values, one record per `put`.
pub struct ValueWriter<S: ValueSerde> {
    writer: PageWriter,
    serde: S,
}

impl<S: ValueSerde> ValueWriter<S> {
    pub fn new(writer: PageWriter, serde: S) -> Self {
        Self { writer, serde }
    }

    pub fn put(&mut self, value: &S::Value) {
        self.serde.write_value(value, &mut self.writer);
        self.writer.end_page();
    }

    pub fn close(&mut self) {
        self.writer.close();
    }
}

/// Writes keyed records, one record per `put`.
pub struct KeyValueWriter<S: KeyValueSerde> {
    writer: PageWriter,
    serde: S,
}

impl<S: KeyValueSerde> KeyValueWriter<S> {
    pub fn new(writer: PageWriter, serde: S) -> Self {
        Self { writer, serde }
    }

    pub fn put(&mut self, key: &S::Key, value: &S::Value) {
        self.serde.write_key(key, &mut self.writer);
        self.writer.end_key();
        self.serde.write_value(value, &mut self.writer);
        self.writer.end_page();
    }

    pub fn close(&mut self) {
        self.writer.close();
    }
}

/// Reads plain values off a non-keyed cursor.
pub struct ValueReader<S: ValueSerde> {
    reader: PageReader,
    serde: S,
}

impl<S: ValueSerde> ValueReader<S> {
    pub fn from_cursor(cursor: InputCursor, serde: S) -> Result<Self, EngineError> {
        if cursor.is_keyed() {
            return Err(EngineError::Invariant(
                "plain value reader opened on a keyed cursor".to_string(),
            ));
        }
        let (_, values) = cursor.into_parts();
        Ok(Self {
            reader: PageReader::new(values),
            serde,
        })
    }

    pub fn next(&mut self) -> Option<S::Value> {
        if self.reader.advance() {
            Some(self.serde.read_value(&mut self.reader))
        } else {
            None
        }
    }
}

/// Iterates a keyed cursor group by group, then member values within the
/// current group.
pub struct GroupReader<S: KeyValueSerde> {
    keys: PageReader,
    values: PageReader,
    serde: S,
}

impl<S: KeyValueSerde> GroupReader<S> {
    pub fn from_cursor(cursor: InputCursor, serde: S) -> Result<Self, EngineError> {
        let (keys, values) = cursor.into_parts();
        let keys = keys.ok_or_else(|| {
            EngineError::Invariant("group reader opened on a non-keyed cursor".to_string())
        })?;
        Ok(Self {
            keys: PageReader::new(keys),
            values: PageReader::new(values),
            serde,
        })
    }

    /// Advance to the next key group and decode its key.
    pub fn next_group(&mut self) -> Option<S::Key> {
        if self.keys.advance() {
            let has_values = self.values.advance();
            debug_assert!(has_values, "key group without a value entry");
            Some(self.serde.read_key(&mut self.keys))
        } else {
            None
        }
    }

    /// Decode the next member value of the current group.
    pub fn next_value(&mut self) -> Option<S::Value> {
        if self.values.remaining() == 0 {
            None
        } else {
            Some(self.serde.read_value(&mut self.values))
        }
    }
}
