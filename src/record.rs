//! Log container access.
//!
//! Logs are MCAP files. [`RecordReader`] memory-maps a log and streams its
//! messages forward, in file order, without an index. [`RecordWriter`]
//! streams a new log forward and refuses to write a message whose channel
//! descriptor has not been written first.

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use mcap::{MessageStream, Writer, records::MessageHeader};
use memmap2::Mmap;

use crate::error::ReframeError;

/// Binary schema of a channel's payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    /// Type name, e.g. `foxglove_msgs/msg/CompressedVideo`.
    pub name: String,
    /// Schema encoding, e.g. `ros2msg` or `protobuf`.
    pub encoding: String,
    /// Encoded schema definition.
    pub data: Vec<u8>,
}

/// Everything a reader needs to interpret one channel's messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub topic: String,
    pub message_encoding: String,
    pub schema: Option<SchemaDescriptor>,
    pub metadata: BTreeMap<String, String>,
}

/// One message read from a source log.
pub struct RecordMessage<'a> {
    message: mcap::Message<'a>,
}

impl<'a> From<mcap::Message<'a>> for RecordMessage<'a> {
    fn from(message: mcap::Message<'a>) -> Self {
        Self { message }
    }
}

impl RecordMessage<'_> {
    /// Channel topic.
    pub fn topic(&self) -> &str {
        &self.message.channel.topic
    }

    /// Log time in nanoseconds.
    pub fn log_time(&self) -> u64 {
        self.message.log_time
    }

    /// Publish time in nanoseconds.
    pub fn publish_time(&self) -> u64 {
        self.message.publish_time
    }

    /// Per-channel sequence number.
    pub fn sequence(&self) -> u32 {
        self.message.sequence
    }

    /// Raw payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.message.data
    }

    /// Declared type name, if the channel has a schema.
    pub fn type_name(&self) -> Option<&str> {
        self.message
            .channel
            .schema
            .as_ref()
            .map(|schema| schema.name.as_str())
    }

    /// Snapshot of this message's channel descriptor.
    pub fn descriptor(&self) -> ChannelDescriptor {
        let channel = &self.message.channel;
        ChannelDescriptor {
            topic: channel.topic.clone(),
            message_encoding: channel.message_encoding.clone(),
            schema: channel.schema.as_ref().map(|schema| SchemaDescriptor {
                name: schema.name.clone(),
                encoding: schema.encoding.clone(),
                data: schema.data.to_vec(),
            }),
            metadata: channel.metadata.clone(),
        }
    }
}

/// Forward-only reader over a memory-mapped log.
pub struct RecordReader {
    path: PathBuf,
    mapped: Mmap,
}

impl RecordReader {
    /// Memory-map a log for reading.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::FileOpen`] if the file cannot be opened or mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReframeError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening log {}", path.display());

        let file = File::open(&path).map_err(|error| ReframeError::FileOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;
        // SAFETY: the source log is treated as immutable for the whole run.
        let mapped = unsafe { Mmap::map(&file) }.map_err(|error| ReframeError::FileOpen {
            path: path.clone(),
            reason: format!("unable to memory map: {error}"),
        })?;

        Ok(Self { path, mapped })
    }

    /// Path of the mapped log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream every message in file order.
    ///
    /// Each call starts a fresh pass from the beginning of the log.
    ///
    /// The log header is validated lazily, so a file that is not a log
    /// surfaces its error on the first item rather than here.
    pub fn messages<'a>(
        &'a self,
    ) -> Result<impl Iterator<Item = Result<RecordMessage<'a>, ReframeError>> + 'a, ReframeError>
    {
        let stream = MessageStream::new(&self.mapped[..])?;
        Ok(stream.map(|message| -> Result<RecordMessage<'a>, ReframeError> {
            Ok(RecordMessage::from(message?))
        }))
    }
}

/// Forward-only log writer.
///
/// Channels must be declared with [`write_channel`](RecordWriter::write_channel)
/// before any of their messages are written.
pub struct RecordWriter {
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
    channel_ids: HashMap<String, u16>,
}

impl RecordWriter {
    /// Create (or truncate) a log for writing.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::FileOpen`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ReframeError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Creating log {}", path.display());

        let file = File::create(&path).map_err(|error| ReframeError::FileOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;
        let writer = Writer::new(BufWriter::new(file))?;

        Ok(Self {
            path,
            writer,
            channel_ids: HashMap::new(),
        })
    }

    /// Path of the log being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a descriptor has been written for `topic`.
    pub fn has_channel(&self, topic: &str) -> bool {
        self.channel_ids.contains_key(topic)
    }

    /// Write a channel descriptor, returning its channel id.
    ///
    /// Writing the same topic twice returns the existing id without
    /// emitting a second record.
    pub fn write_channel(&mut self, descriptor: &ChannelDescriptor) -> Result<u16, ReframeError> {
        if let Some(&channel_id) = self.channel_ids.get(&descriptor.topic) {
            return Ok(channel_id);
        }

        let schema_id = match &descriptor.schema {
            Some(schema) => self
                .writer
                .add_schema(&schema.name, &schema.encoding, &schema.data)?,
            None => 0,
        };
        let channel_id = self.writer.add_channel(
            schema_id,
            &descriptor.topic,
            &descriptor.message_encoding,
            &descriptor.metadata,
        )?;

        self.channel_ids
            .insert(descriptor.topic.clone(), channel_id);
        Ok(channel_id)
    }

    /// Write one message on a declared channel.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::UndeclaredChannel`] if no descriptor has been
    /// written for `topic`.
    pub fn write_message(
        &mut self,
        topic: &str,
        sequence: u32,
        log_time: u64,
        publish_time: u64,
        data: &[u8],
    ) -> Result<(), ReframeError> {
        let channel_id =
            *self
                .channel_ids
                .get(topic)
                .ok_or_else(|| ReframeError::UndeclaredChannel {
                    topic: topic.to_string(),
                })?;

        let header = MessageHeader {
            channel_id,
            sequence,
            log_time,
            publish_time,
        };
        self.writer.write_to_known_channel(&header, data)?;
        Ok(())
    }

    /// Write the summary and footer and close the log.
    pub fn close(mut self) -> Result<(), ReframeError> {
        self.writer.finish()?;
        log::debug!("Closed log {}", self.path.display());
        Ok(())
    }
}
