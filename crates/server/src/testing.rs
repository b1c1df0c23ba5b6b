//! Test doubles for the interception layer
//!
//! [`FakeBackend`] stands in for a traced API with a fixed function table,
//! a few objects and a scripted state tree, so the command server can be
//! exercised end to end without a real graphics driver.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use transport::{
    DataKind, DataRequest, DataResponse, EventKind, StateCursor, StateNode, StateValue,
};

use crate::backend::{Backend, CallId, CallRecord, ModuleStatus, ObjectError};

#[derive(Default)]
struct FakeState {
    in_atomic_block: bool,
    modules: HashMap<String, ModuleStatus>,
    buffers: HashMap<u32, Vec<u8>>,
    textures: HashMap<u32, (u32, u32, Vec<u8>)>,
    shaders: HashMap<u32, String>,
    pending_error: Option<String>,
    failing_compiles: HashSet<u32>,
    tree: StateNode,
    finished: usize,
}

pub struct FakeBackend {
    functions: Vec<String>,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(functions: &[&str]) -> Self {
        let tree = StateNode::new("").with_child(
            StateNode::new("GL_BLEND")
                .with_enum_name(0x0be2)
                .with_value(StateValue::new("GLboolean", 1, vec![0])),
        );
        Self {
            functions: functions.iter().map(|f| f.to_string()).collect(),
            state: Mutex::new(FakeState {
                tree,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build a call record for one of the known functions
    pub fn call(&self, name: &str, args: &str) -> FakeCall {
        let id = self
            .function_id(name)
            .unwrap_or_else(|| panic!("{name} is not in the fake function table"));
        FakeCall {
            id,
            name: name.to_string(),
            args: args.to_string(),
        }
    }

    pub fn set_in_atomic_block(&self, inside: bool) {
        self.lock().in_atomic_block = inside;
    }

    pub fn add_module(&self, name: &str, loaded: bool, active: bool) {
        self.lock()
            .modules
            .insert(name.to_string(), ModuleStatus { loaded, active });
    }

    pub fn module(&self, name: &str) -> Option<ModuleStatus> {
        self.lock().modules.get(name).copied()
    }

    pub fn add_buffer(&self, id: u32, data: Vec<u8>) {
        self.lock().buffers.insert(id, data);
    }

    pub fn add_texture(&self, id: u32, width: u32, height: u32, data: Vec<u8>) {
        self.lock().textures.insert(id, (width, height, data));
    }

    pub fn add_shader(&self, id: u32, source: &str) {
        self.lock().shaders.insert(id, source.to_string());
    }

    pub fn set_state(&self, tree: StateNode) {
        self.lock().tree = tree;
    }

    /// The next completed call reports this API error
    pub fn raise_error(&self, name: &str) {
        self.lock().pending_error = Some(name.to_string());
    }

    pub fn fail_compile(&self, shader: u32) {
        self.lock().failing_compiles.insert(shader);
    }

    /// How many times rendering was flushed before a halt
    pub fn finish_count(&self) -> usize {
        self.lock().finished
    }
}

impl Backend for FakeBackend {
    fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn function_id(&self, name: &str) -> Option<CallId> {
        self.functions.iter().position(|f| f == name)
    }

    fn in_atomic_block(&self) -> bool {
        self.lock().in_atomic_block
    }

    fn finish_rendering(&self) {
        self.lock().finished += 1;
    }

    fn state_root(&self) -> Box<dyn StateCursor + '_> {
        Box::new(self.lock().tree.clone())
    }

    fn read_object(&self, request: &DataRequest) -> Result<DataResponse, ObjectError> {
        let state = self.lock();
        let invalid = || ObjectError::InvalidId {
            kind: request.kind(),
            id: request.object(),
        };
        match *request {
            DataRequest::Buffer { object } => {
                let data = state.buffers.get(&object).ok_or_else(invalid)?;
                Ok(DataResponse::Buffer { data: data.clone() })
            }
            DataRequest::Texture { object, .. } => {
                let (width, height, data) = state.textures.get(&object).ok_or_else(invalid)?;
                Ok(DataResponse::Texture {
                    data: data.clone(),
                    width: *width,
                    height: *height,
                    depth: 1,
                })
            }
            DataRequest::Shader { object, .. } => {
                let source = state.shaders.get(&object).ok_or_else(invalid)?;
                Ok(DataResponse::Shader {
                    data: source.clone().into_bytes(),
                })
            }
            DataRequest::InfoLog { .. } => Err(ObjectError::Failed("no info log".to_string())),
            DataRequest::Framebuffer { .. } => Err(ObjectError::MissingCapability(format!(
                "{} reads",
                DataKind::Framebuffer
            ))),
        }
    }

    fn module_status(&self, name: &str) -> Option<ModuleStatus> {
        self.module(name)
    }

    fn set_module_active(&self, name: &str, active: bool) {
        if let Some(status) = self.lock().modules.get_mut(name) {
            status.active = active;
        }
    }

    fn detect_event(&self, call: &dyn CallRecord, event: EventKind) -> Option<String> {
        let mut state = self.lock();
        match event {
            EventKind::GlError => state.pending_error.take(),
            EventKind::CompileError => {
                let shader = call
                    .dump()
                    .trim_start_matches("glCompileShader(")
                    .trim_end_matches(')')
                    .parse::<u32>()
                    .ok()?;
                (call.name() == "glCompileShader" && state.failing_compiles.contains(&shader))
                    .then(|| "Shader compilation error".to_string())
            }
            EventKind::LinkError => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeCall {
    id: CallId,
    name: String,
    args: String,
}

impl CallRecord for FakeCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dump(&self) -> String {
        format!("{}({})", self.name, self.args)
    }
}
