//! Test helpers: a tiny SPIR-V emitter and device setup.
//!
//! No shader compiler is needed to run the GPU tests; kernels are assembled
//! word by word here.

#![allow(dead_code)]

use std::sync::Arc;

use vkcompute::{Context, EngineConfig, KernelBinary};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_VERSION_1_0: u32 = 0x0001_0000;

// Opcodes.
const OP_MEMORY_MODEL: u32 = 14;
const OP_ENTRY_POINT: u32 = 15;
const OP_EXECUTION_MODE: u32 = 16;
const OP_CAPABILITY: u32 = 17;
const OP_TYPE_VOID: u32 = 19;
const OP_TYPE_INT: u32 = 21;
const OP_TYPE_FLOAT: u32 = 22;
const OP_TYPE_VECTOR: u32 = 23;
const OP_TYPE_RUNTIME_ARRAY: u32 = 29;
const OP_TYPE_STRUCT: u32 = 30;
const OP_TYPE_POINTER: u32 = 32;
const OP_TYPE_FUNCTION: u32 = 33;
const OP_CONSTANT: u32 = 43;
const OP_SPEC_CONSTANT: u32 = 50;
const OP_SPEC_CONSTANT_COMPOSITE: u32 = 51;
const OP_FUNCTION: u32 = 54;
const OP_FUNCTION_END: u32 = 56;
const OP_VARIABLE: u32 = 59;
const OP_LOAD: u32 = 61;
const OP_STORE: u32 = 62;
const OP_ACCESS_CHAIN: u32 = 65;
const OP_DECORATE: u32 = 71;
const OP_MEMBER_DECORATE: u32 = 72;
const OP_COMPOSITE_EXTRACT: u32 = 81;
const OP_FADD: u32 = 129;
const OP_FSUB: u32 = 131;
const OP_LABEL: u32 = 248;
const OP_RETURN: u32 = 253;

// Enumerants.
const CAPABILITY_SHADER: u32 = 1;
const ADDRESSING_LOGICAL: u32 = 0;
const MEMORY_MODEL_GLSL450: u32 = 1;
const EXECUTION_MODEL_GL_COMPUTE: u32 = 5;
const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;
const STORAGE_INPUT: u32 = 1;
const STORAGE_UNIFORM: u32 = 2;
const DECORATION_SPEC_ID: u32 = 1;
const DECORATION_BUFFER_BLOCK: u32 = 3;
const DECORATION_ARRAY_STRIDE: u32 = 6;
const DECORATION_BUILTIN: u32 = 11;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;
const DECORATION_OFFSET: u32 = 35;
const BUILTIN_WORKGROUP_SIZE: u32 = 25;
const BUILTIN_GLOBAL_INVOCATION_ID: u32 = 28;

/// Accumulates instructions and hands out result ids.
#[derive(Debug, Default)]
pub struct Assembler {
    next_id: u32,
    body: Vec<u32>,
}

impl Assembler {
    pub fn new() -> Self {
        Self { next_id: 1, body: Vec::new() }
    }

    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn op(&mut self, opcode: u32, operands: &[u32]) {
        let word_count = operands.len() as u32 + 1;
        self.body.push((word_count << 16) | opcode);
        self.body.extend_from_slice(operands);
    }

    /// Nul-terminated, zero-padded literal string.
    pub fn string(text: &str) -> Vec<u32> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
    }

    pub fn finish(self) -> Vec<u32> {
        let mut words = vec![SPIRV_MAGIC, SPIRV_VERSION_1_0, 0, self.next_id, 0];
        words.extend(self.body);
        words
    }
}

/// `out[i] = a[i] + b[i]` with `a`, `b`, `out` at bindings 0, 1, 2 and the
/// workgroup size taken from specialization constants 0, 1, 2.
pub fn add_kernel_words() -> Vec<u32> {
    elementwise_kernel_words(OP_FADD)
}

/// `out[i] = a[i] - b[i]`, laid out like [`add_kernel_words`].
pub fn sub_kernel_words() -> Vec<u32> {
    elementwise_kernel_words(OP_FSUB)
}

fn elementwise_kernel_words(float_op: u32) -> Vec<u32> {
    let mut asm = Assembler::new();
    let void = asm.id();
    let fn_void = asm.id();
    let uint = asm.id();
    let float = asm.id();
    let v3uint = asm.id();
    let ptr_in_v3uint = asm.id();
    let gid = asm.id();
    let rt_float = asm.id();
    let buf = asm.id();
    let ptr_buf = asm.id();
    let a = asm.id();
    let b = asm.id();
    let c = asm.id();
    let ptr_float = asm.id();
    let int = asm.id();
    let int_0 = asm.id();
    let wg_x = asm.id();
    let wg_y = asm.id();
    let wg_z = asm.id();
    let wg_size = asm.id();
    let main = asm.id();

    asm.op(OP_CAPABILITY, &[CAPABILITY_SHADER]);
    asm.op(OP_MEMORY_MODEL, &[ADDRESSING_LOGICAL, MEMORY_MODEL_GLSL450]);
    let mut entry = vec![EXECUTION_MODEL_GL_COMPUTE, main];
    entry.extend(Assembler::string("main"));
    entry.push(gid);
    asm.op(OP_ENTRY_POINT, &entry);
    asm.op(OP_EXECUTION_MODE, &[main, EXECUTION_MODE_LOCAL_SIZE, 1, 1, 1]);

    asm.op(OP_DECORATE, &[gid, DECORATION_BUILTIN, BUILTIN_GLOBAL_INVOCATION_ID]);
    asm.op(OP_DECORATE, &[wg_size, DECORATION_BUILTIN, BUILTIN_WORKGROUP_SIZE]);
    for (spec_id, target) in [wg_x, wg_y, wg_z].into_iter().enumerate() {
        asm.op(OP_DECORATE, &[target, DECORATION_SPEC_ID, spec_id as u32]);
    }
    asm.op(OP_DECORATE, &[rt_float, DECORATION_ARRAY_STRIDE, 4]);
    asm.op(OP_MEMBER_DECORATE, &[buf, 0, DECORATION_OFFSET, 0]);
    asm.op(OP_DECORATE, &[buf, DECORATION_BUFFER_BLOCK]);
    for (binding, var) in [a, b, c].into_iter().enumerate() {
        asm.op(OP_DECORATE, &[var, DECORATION_DESCRIPTOR_SET, 0]);
        asm.op(OP_DECORATE, &[var, DECORATION_BINDING, binding as u32]);
    }

    asm.op(OP_TYPE_VOID, &[void]);
    asm.op(OP_TYPE_FUNCTION, &[fn_void, void]);
    asm.op(OP_TYPE_INT, &[uint, 32, 0]);
    asm.op(OP_TYPE_FLOAT, &[float, 32]);
    asm.op(OP_TYPE_VECTOR, &[v3uint, uint, 3]);
    asm.op(OP_TYPE_POINTER, &[ptr_in_v3uint, STORAGE_INPUT, v3uint]);
    asm.op(OP_VARIABLE, &[ptr_in_v3uint, gid, STORAGE_INPUT]);
    asm.op(OP_TYPE_RUNTIME_ARRAY, &[rt_float, float]);
    asm.op(OP_TYPE_STRUCT, &[buf, rt_float]);
    asm.op(OP_TYPE_POINTER, &[ptr_buf, STORAGE_UNIFORM, buf]);
    for var in [a, b, c] {
        asm.op(OP_VARIABLE, &[ptr_buf, var, STORAGE_UNIFORM]);
    }
    asm.op(OP_TYPE_POINTER, &[ptr_float, STORAGE_UNIFORM, float]);
    asm.op(OP_TYPE_INT, &[int, 32, 1]);
    asm.op(OP_CONSTANT, &[int, int_0, 0]);
    for dim in [wg_x, wg_y, wg_z] {
        asm.op(OP_SPEC_CONSTANT, &[uint, dim, 1]);
    }
    asm.op(OP_SPEC_CONSTANT_COMPOSITE, &[v3uint, wg_size, wg_x, wg_y, wg_z]);

    let label = asm.id();
    let gid_value = asm.id();
    let index = asm.id();
    let pa = asm.id();
    let va = asm.id();
    let pb = asm.id();
    let vb = asm.id();
    let result = asm.id();
    let pc = asm.id();

    asm.op(OP_FUNCTION, &[void, main, 0, fn_void]);
    asm.op(OP_LABEL, &[label]);
    asm.op(OP_LOAD, &[v3uint, gid_value, gid]);
    asm.op(OP_COMPOSITE_EXTRACT, &[uint, index, gid_value, 0]);
    asm.op(OP_ACCESS_CHAIN, &[ptr_float, pa, a, int_0, index]);
    asm.op(OP_LOAD, &[float, va, pa]);
    asm.op(OP_ACCESS_CHAIN, &[ptr_float, pb, b, int_0, index]);
    asm.op(OP_LOAD, &[float, vb, pb]);
    asm.op(float_op, &[float, result, va, vb]);
    asm.op(OP_ACCESS_CHAIN, &[ptr_float, pc, c, int_0, index]);
    asm.op(OP_STORE, &[pc, result]);
    asm.op(OP_RETURN, &[]);
    asm.op(OP_FUNCTION_END, &[]);

    asm.finish()
}

pub fn add_kernel() -> KernelBinary {
    KernelBinary::from_words(add_kernel_words()).expect("assembled kernel is non-empty")
}

pub fn sub_kernel() -> KernelBinary {
    KernelBinary::from_words(sub_kernel_words()).expect("assembled kernel is non-empty")
}

/// The add kernel as a little-endian byte blob, as it would be read from a
/// `.spv` file.
pub fn add_kernel_bytes() -> Vec<u8> {
    add_kernel_words().iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn open_context() -> Arc<Context> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Context::open(&EngineConfig::default()).expect("Vulkan device required")
}

pub fn ramp(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32).collect()
}

pub fn reverse_ramp(n: usize) -> Vec<f32> {
    (0..n).map(|i| (n - i) as f32).collect()
}
