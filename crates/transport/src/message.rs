//! Typed protocol messages
//!
//! Every message starts with a code and a correlation id; the code alone
//! decides the shape of the payload that follows. Requests travel from the
//! client to the traced program and responses travel back.
//!
//! ```
//! use transport::{Request, RequestBody};
//!
//! let request = Request::new(7, RequestBody::SetBreakpoint {
//!     function: "glDrawArrays".to_string(),
//!     enabled: true,
//! });
//!
//! let mut wire = Vec::new();
//! request.send(&mut wire)?;
//! let decoded = Request::recv(&mut &wire[..])?;
//! assert_eq!(decoded, request);
//! # Ok::<(), transport::CodecError>(())
//! ```

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{
    put_binary, put_code, put_code64, put_string, recv_binary, recv_code, recv_code64,
    recv_string, send_frame,
};
use crate::tree::{self, StateNode};
use crate::CodecError;

/// Identifier echoed from a request into the responses it causes
pub type CorrelationId = u32;

/// Operation codes
pub mod code {
    pub const REQ_RUN: u32 = 0xdcba_0000;
    pub const REQ_CONTINUE: u32 = 0xdcba_0001;
    pub const REQ_STEP: u32 = 0xdcba_0002;
    pub const REQ_BREAK: u32 = 0xdcba_0003;
    pub const REQ_QUIT: u32 = 0xdcba_0006;
    pub const REQ_ASYNC: u32 = 0xdcba_0007;
    pub const REQ_ACTIVATE_MODULE: u32 = 0xdcba_0009;
    pub const REQ_DEACTIVATE_MODULE: u32 = 0xdcba_000a;
    pub const REQ_DATA: u32 = 0xdcba_000c;
    pub const REQ_STATE_TREE: u32 = 0xdcba_000e;
    pub const REQ_BREAK_EVENT: u32 = 0xdcba_000f;

    pub const RESP_ANS: u32 = 0xabcd_0000;
    pub const RESP_BREAK: u32 = 0xabcd_0001;
    pub const RESP_BREAK_EVENT: u32 = 0xabcd_0002;
    pub const RESP_ERROR: u32 = 0xabcd_0005;
    pub const RESP_RUNNING: u32 = 0xabcd_0006;
    pub const RESP_DATA: u32 = 0xabcd_000a;
    pub const RESP_STATE_NODE_END: u32 = 0xabcd_000c;
    pub const RESP_STATE_NODE_BEGIN: u32 = 0xabcd_000d;

    pub const DATA_TEXTURE: u32 = 0xedbc_0000;
    pub const DATA_SHADER: u32 = 0xedbc_0001;
    pub const DATA_FRAMEBUFFER: u32 = 0xedbc_0002;
    pub const DATA_INFO_LOG: u32 = 0xedbc_0003;
    pub const DATA_BUFFER: u32 = 0xedbc_0004;
}

/// Conditions, other than reaching a call, that can halt the traced program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A call raised an API error
    GlError,
    /// A shader failed to compile
    CompileError,
    /// A program failed to link
    LinkError,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::GlError,
        EventKind::CompileError,
        EventKind::LinkError,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn code(self) -> u32 {
        match self {
            EventKind::GlError => 0,
            EventKind::CompileError => 1,
            EventKind::LinkError => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.code() == code)
    }

    pub fn index(self) -> usize {
        self.code() as usize
    }

    /// Name used on the command line and in configuration files
    pub fn name(self) -> &'static str {
        match self {
            EventKind::GlError => "error",
            EventKind::CompileError => "compile-error",
            EventKind::LinkError => "link-error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| eyre::eyre!("invalid event {s}"))
    }
}

/// The object kinds that can be fetched with a data request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Texture,
    Shader,
    Framebuffer,
    InfoLog,
    Buffer,
}

impl DataKind {
    pub fn code(self) -> u32 {
        match self {
            DataKind::Texture => code::DATA_TEXTURE,
            DataKind::Shader => code::DATA_SHADER,
            DataKind::Framebuffer => code::DATA_FRAMEBUFFER,
            DataKind::InfoLog => code::DATA_INFO_LOG,
            DataKind::Buffer => code::DATA_BUFFER,
        }
    }

    pub fn from_code(subtype: u32) -> Result<Self, CodecError> {
        Ok(match subtype {
            code::DATA_TEXTURE => DataKind::Texture,
            code::DATA_SHADER => DataKind::Shader,
            code::DATA_FRAMEBUFFER => DataKind::Framebuffer,
            code::DATA_INFO_LOG => DataKind::InfoLog,
            code::DATA_BUFFER => DataKind::Buffer,
            other => return Err(CodecError::UnknownDataSubtype(other)),
        })
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataKind::Texture => "texture",
            DataKind::Shader => "shader",
            DataKind::Framebuffer => "framebuffer",
            DataKind::InfoLog => "info log",
            DataKind::Buffer => "buffer",
        })
    }
}

/// Object data request; all fields are raw API enums and names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRequest {
    Texture {
        object: u32,
        target: u32,
        face: u32,
        level: u32,
        format: u32,
        ty: u32,
    },
    Shader {
        object: u32,
        target: u32,
    },
    Framebuffer {
        object: u32,
        target: u32,
        buffer: u32,
        format: u32,
        ty: u32,
    },
    InfoLog {
        object: u32,
        target: u32,
    },
    Buffer {
        object: u32,
    },
}

impl DataRequest {
    pub fn kind(&self) -> DataKind {
        match self {
            DataRequest::Texture { .. } => DataKind::Texture,
            DataRequest::Shader { .. } => DataKind::Shader,
            DataRequest::Framebuffer { .. } => DataKind::Framebuffer,
            DataRequest::InfoLog { .. } => DataKind::InfoLog,
            DataRequest::Buffer { .. } => DataKind::Buffer,
        }
    }

    pub fn object(&self) -> u32 {
        match *self {
            DataRequest::Texture { object, .. }
            | DataRequest::Shader { object, .. }
            | DataRequest::Framebuffer { object, .. }
            | DataRequest::InfoLog { object, .. }
            | DataRequest::Buffer { object } => object,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        put_code(buf, self.kind().code());
        match *self {
            DataRequest::Texture {
                object,
                target,
                face,
                level,
                format,
                ty,
            } => {
                for field in [object, target, face, level, format, ty] {
                    put_code(buf, field);
                }
            }
            DataRequest::Framebuffer {
                object,
                target,
                buffer,
                format,
                ty,
            } => {
                for field in [object, target, buffer, format, ty] {
                    put_code(buf, field);
                }
            }
            DataRequest::Shader { object, target } | DataRequest::InfoLog { object, target } => {
                put_code(buf, object);
                put_code(buf, target);
            }
            DataRequest::Buffer { object } => put_code(buf, object),
        }
    }

    fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let kind = DataKind::from_code(recv_code(reader)?)?;
        let request = match kind {
            DataKind::Texture => DataRequest::Texture {
                object: recv_code(reader)?,
                target: recv_code(reader)?,
                face: recv_code(reader)?,
                level: recv_code(reader)?,
                format: recv_code(reader)?,
                ty: recv_code(reader)?,
            },
            DataKind::Shader => DataRequest::Shader {
                object: recv_code(reader)?,
                target: recv_code(reader)?,
            },
            DataKind::Framebuffer => DataRequest::Framebuffer {
                object: recv_code(reader)?,
                target: recv_code(reader)?,
                buffer: recv_code(reader)?,
                format: recv_code(reader)?,
                ty: recv_code(reader)?,
            },
            DataKind::InfoLog => DataRequest::InfoLog {
                object: recv_code(reader)?,
                target: recv_code(reader)?,
            },
            DataKind::Buffer => DataRequest::Buffer {
                object: recv_code(reader)?,
            },
        };
        Ok(request)
    }
}

/// Object data returned for a [`DataRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataResponse {
    Texture {
        data: Vec<u8>,
        width: u32,
        height: u32,
        depth: u32,
    },
    Shader {
        data: Vec<u8>,
    },
    Framebuffer {
        data: Vec<u8>,
        width: u32,
        height: u32,
    },
    InfoLog {
        data: Vec<u8>,
    },
    Buffer {
        data: Vec<u8>,
    },
}

impl DataResponse {
    pub fn kind(&self) -> DataKind {
        match self {
            DataResponse::Texture { .. } => DataKind::Texture,
            DataResponse::Shader { .. } => DataKind::Shader,
            DataResponse::Framebuffer { .. } => DataKind::Framebuffer,
            DataResponse::InfoLog { .. } => DataKind::InfoLog,
            DataResponse::Buffer { .. } => DataKind::Buffer,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            DataResponse::Texture { data, .. }
            | DataResponse::Shader { data }
            | DataResponse::Framebuffer { data, .. }
            | DataResponse::InfoLog { data }
            | DataResponse::Buffer { data } => data,
        }
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        put_code(buf, self.kind().code());
        put_binary(buf, self.data())?;
        match *self {
            DataResponse::Texture {
                width,
                height,
                depth,
                ..
            } => {
                put_code(buf, width);
                put_code(buf, height);
                put_code(buf, depth);
            }
            DataResponse::Framebuffer { width, height, .. } => {
                put_code(buf, width);
                put_code(buf, height);
            }
            DataResponse::Shader { .. }
            | DataResponse::InfoLog { .. }
            | DataResponse::Buffer { .. } => {}
        }
        Ok(())
    }

    fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let kind = DataKind::from_code(recv_code(reader)?)?;
        let data = recv_binary(reader)?;
        let response = match kind {
            DataKind::Texture => DataResponse::Texture {
                data,
                width: recv_code(reader)?,
                height: recv_code(reader)?,
                depth: recv_code(reader)?,
            },
            DataKind::Framebuffer => DataResponse::Framebuffer {
                data,
                width: recv_code(reader)?,
                height: recv_code(reader)?,
            },
            DataKind::Shader => DataResponse::Shader { data },
            DataKind::InfoLog => DataResponse::InfoLog { data },
            DataKind::Buffer => DataResponse::Buffer { data },
        };
        Ok(response)
    }
}

/// Client to server messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Start the program; answered with [`ResponseBody::Running`]
    Run,
    Continue,
    /// Resume and halt again on the next call
    Step,
    Quit,
    /// Halt as soon as possible
    Async,
    SetBreakpoint {
        function: String,
        enabled: bool,
    },
    /// Raw event number so that an out-of-range value can be reported back
    SetBreakEvent {
        event: u32,
        enabled: bool,
    },
    ActivateModule {
        name: String,
    },
    DeactivateModule {
        name: String,
    },
    StateTree,
    Data(DataRequest),
}

impl RequestBody {
    pub fn code(&self) -> u32 {
        match self {
            RequestBody::Run => code::REQ_RUN,
            RequestBody::Continue => code::REQ_CONTINUE,
            RequestBody::Step => code::REQ_STEP,
            RequestBody::Quit => code::REQ_QUIT,
            RequestBody::Async => code::REQ_ASYNC,
            RequestBody::SetBreakpoint { .. } => code::REQ_BREAK,
            RequestBody::SetBreakEvent { .. } => code::REQ_BREAK_EVENT,
            RequestBody::ActivateModule { .. } => code::REQ_ACTIVATE_MODULE,
            RequestBody::DeactivateModule { .. } => code::REQ_DEACTIVATE_MODULE,
            RequestBody::StateTree => code::REQ_STATE_TREE,
            RequestBody::Data(_) => code::REQ_DATA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: CorrelationId,
    pub body: RequestBody,
}

impl Request {
    pub fn new(id: CorrelationId, body: RequestBody) -> Self {
        Self { id, body }
    }

    pub fn encode(&self) -> Result<BytesMut, CodecError> {
        let mut buf = BytesMut::with_capacity(16);
        put_code(&mut buf, self.body.code());
        put_code(&mut buf, self.id);
        match &self.body {
            RequestBody::Run
            | RequestBody::Continue
            | RequestBody::Step
            | RequestBody::Quit
            | RequestBody::Async
            | RequestBody::StateTree => {}
            RequestBody::SetBreakpoint { function, enabled } => {
                put_string(&mut buf, function)?;
                put_code(&mut buf, u32::from(*enabled));
            }
            RequestBody::SetBreakEvent { event, enabled } => {
                put_code(&mut buf, *event);
                put_code(&mut buf, u32::from(*enabled));
            }
            RequestBody::ActivateModule { name } | RequestBody::DeactivateModule { name } => {
                put_string(&mut buf, name)?;
            }
            RequestBody::Data(data) => data.encode(&mut buf),
        }
        Ok(buf)
    }

    /// Encode and write the request as a single frame
    pub fn send<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), CodecError> {
        let frame = self.encode()?;
        send_frame(writer, &frame)
    }

    /// Block until one complete request has been decoded
    pub fn recv<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let op = recv_code(reader)?;
        let id = recv_code(reader)?;
        let body = match op {
            code::REQ_RUN => RequestBody::Run,
            code::REQ_CONTINUE => RequestBody::Continue,
            code::REQ_STEP => RequestBody::Step,
            code::REQ_QUIT => RequestBody::Quit,
            code::REQ_ASYNC => RequestBody::Async,
            code::REQ_STATE_TREE => RequestBody::StateTree,
            code::REQ_BREAK => RequestBody::SetBreakpoint {
                function: recv_string(reader)?,
                enabled: recv_code(reader)? != 0,
            },
            code::REQ_BREAK_EVENT => RequestBody::SetBreakEvent {
                event: recv_code(reader)?,
                enabled: recv_code(reader)? != 0,
            },
            code::REQ_ACTIVATE_MODULE => RequestBody::ActivateModule {
                name: recv_string(reader)?,
            },
            code::REQ_DEACTIVATE_MODULE => RequestBody::DeactivateModule {
                name: recv_string(reader)?,
            },
            code::REQ_DATA => RequestBody::Data(DataRequest::decode(reader)?),
            other => return Err(CodecError::UnknownRequest(other)),
        };
        Ok(Self { id, body })
    }
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Generic acknowledgement
    Ans { value: u32 },
    /// Halted before a call; carries the rendered call
    Break { call: String },
    /// Halted after a call raised an event
    BreakEvent { call: String, event: String },
    Error { code: u32, message: String },
    Running { pid: u64 },
    StateTree(StateNode),
    Data(DataResponse),
}

impl ResponseBody {
    pub fn code(&self) -> u32 {
        match self {
            ResponseBody::Ans { .. } => code::RESP_ANS,
            ResponseBody::Break { .. } => code::RESP_BREAK,
            ResponseBody::BreakEvent { .. } => code::RESP_BREAK_EVENT,
            ResponseBody::Error { .. } => code::RESP_ERROR,
            ResponseBody::Running { .. } => code::RESP_RUNNING,
            ResponseBody::StateTree(_) => code::RESP_STATE_NODE_BEGIN,
            ResponseBody::Data(_) => code::RESP_DATA,
        }
    }

    /// Whether this response means the traced program has halted
    pub fn is_halt(&self) -> bool {
        matches!(
            self,
            ResponseBody::Break { .. } | ResponseBody::BreakEvent { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: CorrelationId,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(id: CorrelationId, body: ResponseBody) -> Self {
        Self { id, body }
    }

    pub fn encode(&self) -> Result<BytesMut, CodecError> {
        let mut buf = BytesMut::with_capacity(16);
        if let ResponseBody::StateTree(root) = &self.body {
            // the tree carries its own begin/end framing
            let mut writer = buf.writer();
            tree::write_tree(&mut writer, self.id, root)?;
            return Ok(writer.into_inner());
        }

        put_code(&mut buf, self.body.code());
        put_code(&mut buf, self.id);
        match &self.body {
            ResponseBody::Ans { value } => put_code(&mut buf, *value),
            ResponseBody::Break { call } => put_string(&mut buf, call)?,
            ResponseBody::BreakEvent { call, event } => {
                put_string(&mut buf, call)?;
                put_string(&mut buf, event)?;
            }
            ResponseBody::Error { code, message } => {
                put_code(&mut buf, *code);
                put_string(&mut buf, message)?;
            }
            ResponseBody::Running { pid } => put_code64(&mut buf, *pid),
            ResponseBody::Data(data) => data.encode(&mut buf)?,
            ResponseBody::StateTree(_) => unreachable!("state trees are encoded above"),
        }
        Ok(buf)
    }

    /// Encode and write the response as a single frame
    pub fn send<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), CodecError> {
        let frame = self.encode()?;
        send_frame(writer, &frame)
    }

    /// Block until one complete response has been decoded
    ///
    /// A state tree is reconstructed in full before this returns.
    pub fn recv<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let op = recv_code(reader)?;
        let id = recv_code(reader)?;
        let body = match op {
            code::RESP_ANS => ResponseBody::Ans {
                value: recv_code(reader)?,
            },
            code::RESP_BREAK => ResponseBody::Break {
                call: recv_string(reader)?,
            },
            code::RESP_BREAK_EVENT => ResponseBody::BreakEvent {
                call: recv_string(reader)?,
                event: recv_string(reader)?,
            },
            code::RESP_ERROR => ResponseBody::Error {
                code: recv_code(reader)?,
                message: recv_string(reader)?,
            },
            code::RESP_RUNNING => ResponseBody::Running {
                pid: recv_code64(reader)?,
            },
            code::RESP_STATE_NODE_BEGIN => ResponseBody::StateTree(tree::recv_node_body(reader)?),
            code::RESP_DATA => ResponseBody::Data(DataResponse::decode(reader)?),
            code::RESP_STATE_NODE_END => return Err(CodecError::UnexpectedTreeCode(op)),
            other => return Err(CodecError::UnknownResponse(other)),
        };
        Ok(Self { id, body })
    }
}
