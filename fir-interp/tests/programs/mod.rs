//! Modules exercised by the integration tests.

use fir::{
    ConstKind, DynamicArrayConst, FuncId, FunctionBuilder, GlobalId, Module, OpKind, Operand, Ty,
};

/// Declares `name` and builds its entry block with `body`.
fn define(
    module: &mut Module,
    name: &str,
    params: Vec<Ty>,
    ret: Ty,
    body: impl FnOnce(&mut FunctionBuilder),
) -> FuncId {
    let func = module.declare_function(name, Ty::function(params, ret, false));
    let mut b = FunctionBuilder::new(module, func);
    let entry = b.add_block("entry");
    b.position_at_end(entry);
    body(&mut b);
    func
}

/// `name() -> ty` computing `lhs op rhs` on constants.
fn binary_const(module: &mut Module, name: &str, op: OpKind, ty: Ty, lhs: i128, rhs: i128) {
    define(module, name, vec![], ty.clone(), |b| {
        let l = b.const_int(ty.clone(), lhs);
        let r = b.const_int(ty, rhs);
        let result = b.binary(op, l, r);
        b.ret(Some(result));
    });
}

pub fn arithmetic() -> Module {
    let mut module = Module::new("arithmetic");
    binary_const(&mut module, "add_5_3", OpKind::SignedAdd, Ty::i32(), 5, 3);
    binary_const(&mut module, "udiv_7_2", OpKind::UnsignedDiv, Ty::u32(), 7, 2);
    binary_const(&mut module, "smod_neg7_3", OpKind::SignedMod, Ty::i32(), -7, 3);
    binary_const(&mut module, "shl_wraps", OpKind::BitwiseShl, Ty::u8(), 0xff, 4);

    define(&mut module, "divide", vec![Ty::i32(), Ty::i32()], Ty::i32(), |b| {
        let quotient = b.binary(OpKind::SignedDiv, b.arg(0), b.arg(1));
        b.ret(Some(quotient));
    });

    define(&mut module, "compare", vec![Ty::i32(), Ty::i32()], Ty::i32(), |b| {
        let ordering = b.binary(OpKind::ICompareMulti, b.arg(0), b.arg(1));
        let narrowed = b.cast(OpKind::CastIntSize, ordering, Ty::i32());
        b.ret(Some(narrowed));
    });

    define(&mut module, "float_ops", vec![], Ty::f64(), |b| {
        let x = b.const_float(Ty::f64(), 1.5);
        let y = b.const_float(Ty::f64(), 4.0);
        let product = b.binary(OpKind::FloatingMul, x, y.clone());
        let rem = b.binary(OpKind::FloatingMod, product, y);
        b.ret(Some(rem));
    });

    define(&mut module, "numeric_casts", vec![], Ty::i64(), |b| {
        let int = b.const_int(Ty::i32(), -3);
        let float = b.cast(OpKind::CastIntToFloat, int, Ty::f64());
        let factor = b.const_float(Ty::f64(), 2.5);
        let scaled = b.binary(OpKind::FloatingMul, float, factor);
        let back = b.cast(OpKind::CastFloatToInt, scaled, Ty::i64());
        b.ret(Some(back));
    });

    define(&mut module, "select_max", vec![Ty::i32(), Ty::i32()], Ty::i32(), |b| {
        let greater = b.binary(OpKind::ICompareGreater, b.arg(0), b.arg(1));
        let max = b.select(greater, b.arg(0), b.arg(1));
        b.ret(Some(max));
    });

    module
}

pub fn control_flow() -> Module {
    let mut module = Module::new("control_flow");

    define(&mut module, "phi_select", vec![Ty::bool()], Ty::i32(), |b| {
        let a = b.add_block("a");
        let other = b.add_block("b");
        let join = b.add_block("join");
        b.cond_branch(b.arg(0), a, other);
        b.position_at_end(a);
        b.branch(join);
        b.position_at_end(other);
        b.branch(join);
        b.position_at_end(join);
        let from_a = b.const_int(Ty::i32(), 10);
        let from_b = b.const_int(Ty::i32(), 20);
        let value = b.phi(Ty::i32(), vec![(a, from_a), (other, from_b)]);
        b.ret(Some(value));
    });

    define(&mut module, "phi_unlisted", vec![], Ty::i32(), |b| {
        let detour = b.add_block("detour");
        let a = b.add_block("a");
        let other = b.add_block("b");
        let join = b.add_block("join");
        b.branch(detour);
        for block in [detour, a, other] {
            b.position_at_end(block);
            b.branch(join);
        }
        b.position_at_end(join);
        let from_a = b.const_int(Ty::i32(), 1);
        let from_b = b.const_int(Ty::i32(), 2);
        let value = b.phi(Ty::i32(), vec![(a, from_a), (other, from_b)]);
        b.ret(Some(value));
    });

    define(&mut module, "countdown", vec![Ty::i64()], Ty::i64(), |b| {
        let zero = b.const_int(Ty::i64(), 0);
        let one = b.const_int(Ty::i64(), 1);
        let done = b.binary(OpKind::ICompareEqual, b.arg(0), zero.clone());
        let base = b.add_block("base");
        let recurse = b.add_block("recurse");
        b.cond_branch(done, base, recurse);

        b.position_at_end(base);
        b.ret(Some(zero));

        b.position_at_end(recurse);
        let next = b.binary(OpKind::SignedSub, b.arg(0), one.clone());
        let func = b.func();
        let depth = b.call(func, vec![next]).expect("countdown returns a value");
        let total = b.binary(OpKind::SignedAdd, depth, one);
        b.ret(Some(total));
    });

    define(&mut module, "use_before_def", vec![Ty::bool()], Ty::i32(), |b| {
        let defines = b.add_block("defines");
        let skips = b.add_block("skips");
        let join = b.add_block("join");
        b.cond_branch(b.arg(0), defines, skips);
        b.position_at_end(defines);
        let one = b.const_int(Ty::i32(), 1);
        let two = b.const_int(Ty::i32(), 2);
        let value = b.binary(OpKind::SignedAdd, one, two);
        b.branch(join);
        b.position_at_end(skips);
        b.branch(join);
        b.position_at_end(join);
        b.ret(Some(value));
    });

    define(&mut module, "unreachable", vec![], Ty::void(), |b| {
        b.unreachable();
    });

    define(&mut module, "no_terminator", vec![], Ty::i32(), |b| {
        b.sizeof(Ty::i32());
    });

    module
}

/// Constant `(u8 7, f64 2.5, i16 -2)`.
fn sample_tuple(module: &mut Module) -> (Ty, Operand) {
    let ty = Ty::tuple(vec![Ty::u8(), Ty::f64(), Ty::i16()]);
    let members = vec![
        module.const_int(Ty::u8(), 7),
        module.const_float(Ty::f64(), 2.5),
        module.const_int(Ty::i16(), -2),
    ];
    let tuple = module.add_constant(ty.clone(), ConstKind::Tuple(members));
    (ty, Operand::Const(tuple))
}

pub fn aggregates() -> Module {
    let mut module = Module::new("aggregates");
    let (tuple_ty, tuple) = sample_tuple(&mut module);

    for (index, ty) in [Ty::u8(), Ty::f64(), Ty::i16()].into_iter().enumerate() {
        let tuple = tuple.clone();
        define(&mut module, &format!("member_{index}"), vec![], ty, |b| {
            let member = b.extract_value(tuple, index);
            b.ret(Some(member));
        });
    }

    let replaced = tuple.clone();
    define(&mut module, "insert_member", vec![], tuple_ty, |b| {
        let nine = b.const_float(Ty::f64(), 9.0);
        let updated = b.insert_value(replaced, nine, 1);
        b.ret(Some(updated));
    });

    define(&mut module, "struct_lvalue", vec![], Ty::i32(), |b| {
        let pair = Ty::structure("Pair", vec![Ty::i32(), Ty::i64()]);
        let lval = b.create_lval(pair);
        let second = b.get_struct_member(lval.clone(), 1);
        let forty = b.const_int(Ty::i64(), 40);
        b.store(forty, second.clone());
        let first = b.get_struct_member(lval, 0);
        let two = b.const_int(Ty::i32(), 2);
        b.store(two, first.clone());
        let narrowed = b.cast(OpKind::IntegerTruncate, second, Ty::i32());
        let sum = b.binary(OpKind::SignedAdd, narrowed, first);
        b.ret(Some(sum));
    });

    define(&mut module, "array_pointer", vec![], Ty::i64(), |b| {
        let array = b.stack_alloc(Ty::array(Ty::i64(), 4));
        let zero = b.const_int(Ty::i64(), 0);
        let two = b.const_int(Ty::i64(), 2);
        let third = b.get_gep2(array, zero, two);
        let seven = b.const_int(Ty::i64(), 7);
        b.write_ptr(seven, third.clone());
        let back = b.const_int(Ty::i64(), -1);
        let second = b.get_pointer(third.clone(), back);
        let five = b.const_int(Ty::i64(), 5);
        b.write_ptr(five, second.clone());
        let x = b.read_ptr(third);
        let y = b.read_ptr(second);
        let sum = b.binary(OpKind::SignedAdd, x, y);
        b.ret(Some(sum));
    });

    define(&mut module, "member_pointers", vec![], Ty::i64(), |b| {
        let pair = Ty::structure("Pair", vec![Ty::i32(), Ty::i64()]);
        let storage = b.stack_alloc(Ty::array(pair.clone(), 2));
        let pairs = b.cast(OpKind::CastPointerType, storage, pair.mut_pointer_to());
        let zero = b.const_int(Ty::i64(), 0);
        let one = b.const_int(Ty::i64(), 1);
        let first = b.get_pointer_to_struct_member(pairs.clone(), zero, 1);
        let second = b.get_pointer_to_struct_member(pairs.clone(), one.clone(), 1);
        let tag = b.get_pointer_to_struct_member(pairs, one, 0);
        let two = b.const_int(Ty::i64(), 2);
        b.write_ptr(two, first.clone());
        let forty = b.const_int(Ty::i64(), 40);
        b.write_ptr(forty, second.clone());
        // Sits between the two i64 members and must not overlap either.
        let minus_one = b.const_int(Ty::i32(), -1);
        b.write_ptr(minus_one, tag);
        let x = b.read_ptr(first);
        let y = b.read_ptr(second);
        let sum = b.binary(OpKind::SignedAdd, x, y);
        b.ret(Some(sum));
    });

    define(&mut module, "raw_union_bits", vec![], Ty::u64(), |b| {
        let bits = Ty::raw_union("Bits", vec![Ty::u64(), Ty::f64()]);
        let storage = b.create_lval(bits);
        let float = b.raw_union_gep(storage.clone(), Ty::f64());
        let one = b.const_float(Ty::f64(), 1.0);
        b.store(one, float);
        let int = b.raw_union_gep(storage, Ty::u64());
        b.ret(Some(int));
    });

    define(&mut module, "any_payload", vec![], Ty::i8(), |b| {
        let payload = b.const_zero(Ty::array(Ty::i8(), 32));
        let nine = b.const_int(Ty::i8(), 9);
        let payload = b.insert_value(payload, nine, 5);
        let boxed = b.const_zero(Ty::any());
        let boxed = b.set_field(OpKind::AnySetData, boxed, payload);
        let data = b.get_field(OpKind::AnyGetData, boxed);
        let byte = b.extract_value(data, 5);
        b.ret(Some(byte));
    });

    define(&mut module, "slice_rebuilt", vec![], Ty::i64(), |b| {
        let storage = b.stack_alloc(Ty::i64());
        let six = b.const_int(Ty::i64(), 6);
        b.write_ptr(six, storage.clone());
        let empty = b.const_zero(Ty::slice(Ty::i64(), true));
        let five = b.const_int(Ty::word(), 5);
        let sized = b.set_field(OpKind::ArraySliceSetLength, empty, five);
        let slice = b.set_field(OpKind::ArraySliceSetData, sized, storage);
        let len = b.get_field(OpKind::ArraySliceGetLength, slice.clone());
        let data = b.get_field(OpKind::ArraySliceGetData, slice);
        let first = b.read_ptr(data);
        let sum = b.binary(OpKind::SignedAdd, len, first);
        b.ret(Some(sum));
    });

    let union_ty = Ty::union("Number", vec![Ty::u8(), Ty::f64()]);
    let union_for_id = union_ty.clone();
    define(&mut module, "union_set_variant", vec![], Ty::i64(), |b| {
        let empty = b.const_zero(union_for_id);
        let one = b.const_int(Ty::word(), 1);
        let tagged = b.set_field(OpKind::UnionSetVariantId, empty, one);
        let id = b.get_field(OpKind::UnionGetVariantId, tagged);
        b.ret(Some(id));
    });

    let union_for_value = union_ty.clone();
    define(&mut module, "union_value", vec![], Ty::f64(), |b| {
        let empty = b.const_zero(union_for_value);
        let payload = b.const_float(Ty::f64(), 2.5);
        let set = b.union_set_value(empty, 1, payload);
        let value = b.union_get_value(set, 1);
        b.ret(Some(value));
    });

    define(&mut module, "union_variant", vec![], Ty::i64(), |b| {
        let empty = b.const_zero(union_ty);
        let payload = b.const_float(Ty::f64(), 2.5);
        let set = b.union_set_value(empty, 1, payload);
        let id = b.get_field(OpKind::UnionGetVariantId, set);
        b.ret(Some(id));
    });

    define(&mut module, "range_span", vec![], Ty::i64(), |b| {
        let range = b.const_zero(Ty::range());
        let three = b.const_int(Ty::word(), 3);
        let ten = b.const_int(Ty::word(), 10);
        let with_step = b.set_field(OpKind::RangeSetStep, range, three);
        let bounded = b.set_field(OpKind::RangeSetUpper, with_step, ten);
        let step = b.get_field(OpKind::RangeGetStep, bounded.clone());
        let upper = b.get_field(OpKind::RangeGetUpper, bounded);
        let product = b.binary(OpKind::SignedMul, step, upper);
        b.ret(Some(product));
    });

    let enum_ty = Ty::enumeration("Code", Ty::i32());
    let index = module.const_int(Ty::word(), 2);
    let value = module.const_int(Ty::i32(), 77);
    let case = module.add_constant(enum_ty, ConstKind::EnumCase { index, value });
    define(&mut module, "enum_index", vec![], Ty::i64(), |b| {
        let index = b.get_field(OpKind::EnumGetIndex, Operand::Const(case));
        b.ret(Some(index));
    });
    define(&mut module, "enum_value", vec![], Ty::i32(), |b| {
        let value = b.get_field(OpKind::EnumGetValue, Operand::Const(case));
        b.ret(Some(value));
    });

    let elements = (1..=3).map(|i| module.const_int(Ty::i32(), i)).collect();
    let array = module.add_constant(Ty::array(Ty::i32(), 3), ConstKind::Array(elements));
    let dynamic = module.add_constant(
        Ty::dynamic_array(Ty::i32()),
        ConstKind::DynamicArray(DynamicArrayConst::Owned { array }),
    );
    define(&mut module, "saa_length", vec![], Ty::i64(), |b| {
        let len = b.get_field(OpKind::SaaGetLength, Operand::Const(dynamic));
        b.ret(Some(len));
    });
    define(&mut module, "saa_capacity", vec![], Ty::i64(), |b| {
        let capacity = b.get_field(OpKind::SaaGetCapacity, Operand::Const(dynamic));
        b.ret(Some(capacity));
    });
    define(&mut module, "saa_third", vec![], Ty::i32(), |b| {
        let data = b.get_field(OpKind::SaaGetData, Operand::Const(dynamic));
        let two = b.const_int(Ty::i64(), 2);
        let third = b.get_pointer(data, two);
        let value = b.read_ptr(third);
        b.ret(Some(value));
    });

    define(&mut module, "any_type_id", vec![], Ty::u64(), |b| {
        let boxed = b.const_zero(Ty::any());
        let id = b.const_int(Ty::u64(), 99);
        let tagged = b.set_field(OpKind::AnySetTypeId, boxed, id);
        let read = b.get_field(OpKind::AnyGetTypeId, tagged);
        b.ret(Some(read));
    });

    let slice_ty = Ty::slice(Ty::i32(), false);
    let data = module.const_zero(Ty::i32().pointer_to());
    let len = module.const_int(Ty::word(), 4);
    let slice = module.add_constant(slice_ty, ConstKind::Slice { data, len });
    define(&mut module, "slice_length", vec![], Ty::i64(), |b| {
        let len = b.get_field(OpKind::ArraySliceGetLength, Operand::Const(slice));
        b.ret(Some(len));
    });

    define(&mut module, "null_read", vec![], Ty::i64(), |b| {
        let null = b.const_zero(Ty::i64().pointer_to());
        let value = b.read_ptr(null);
        b.ret(Some(value));
    });

    define(&mut module, "wild_read", vec![], Ty::i64(), |b| {
        let address = b.const_int(Ty::u64(), 0x10);
        let pointer = b.cast(OpKind::CastIntToPointer, address, Ty::i64().pointer_to());
        let value = b.read_ptr(pointer);
        b.ret(Some(value));
    });

    module
}

pub fn calls() -> Module {
    let mut module = Module::new("calls");
    let unary = Ty::function(vec![Ty::i32()], Ty::i32(), false);

    let twice = define(&mut module, "twice", vec![Ty::i32()], Ty::i32(), |b| {
        let sum = b.binary(OpKind::SignedAdd, b.arg(0), b.arg(0));
        b.ret(Some(sum));
    });
    let apply = define(&mut module, "apply", vec![unary.clone(), Ty::i32()], Ty::i32(), |b| {
        let result = b
            .call_pointer(b.arg(0), vec![b.arg(1)])
            .expect("callee returns a value");
        b.ret(Some(result));
    });
    define(&mut module, "apply_twice", vec![], Ty::i32(), |b| {
        let callee = b.const_function(twice);
        let arg = b.const_int(Ty::i32(), 21);
        let result = b.call(apply, vec![callee, arg]).expect("apply returns a value");
        b.ret(Some(result));
    });

    // Virtual dispatch through a vtable stored in a global.
    let class = Ty::class("Answer", vec![Ty::i32()], 1);
    let method_ty = Ty::function(vec![class.mut_pointer_to()], Ty::i32(), false);
    let method = define(&mut module, "Answer::get", vec![class.mut_pointer_to()], Ty::i32(), |b| {
        let this = b.dereference(b.arg(0));
        let field = b.get_struct_member(this, 1);
        b.ret(Some(field));
    });
    let entry = module.const_function(method);
    let vtable_ty = Ty::array(method_ty.clone(), 1);
    let vtable_init = module.add_constant(vtable_ty.clone(), ConstKind::Array(vec![entry]));
    let vtable = module.add_global("Answer::vtable", vtable_ty, Some(vtable_init));
    define(&mut module, "virtual_answer", vec![], Ty::i32(), |b| {
        let object = b.create_lval(class.clone());
        let vtable = b.global(vtable);
        let vtable_ptr = b.address_of(vtable);
        let erased = b.cast(OpKind::CastPointerType, vtable_ptr, Ty::i8().pointer_to());
        let slot = b.get_struct_member(object.clone(), 0);
        b.store(erased, slot);
        let field = b.get_struct_member(object.clone(), 1);
        let answer = b.const_int(Ty::i32(), 42);
        b.store(answer, field);
        let this = b.address_of(object);
        let result = b
            .call_virtual(class.clone(), 0, method_ty.clone(), this, vec![])
            .expect("method returns a value");
        b.ret(Some(result));
    });

    let native = module.declare_function(
        "native_add",
        Ty::function(vec![Ty::i32(), Ty::i32()], Ty::i32(), false),
    );
    define(&mut module, "call_native", vec![], Ty::i32(), |b| {
        let x = b.const_int(Ty::i32(), 40);
        let y = b.const_int(Ty::i32(), 2);
        let result = b.call(native, vec![x, y]).expect("native_add returns a value");
        b.ret(Some(result));
    });

    let missing = module.declare_function(
        "fir_interp_missing_symbol",
        Ty::function(vec![], Ty::i32(), false),
    );
    define(&mut module, "call_missing", vec![], Ty::i32(), |b| {
        let result = b.call(missing, vec![]).expect("declared with a result");
        b.ret(Some(result));
    });

    define(&mut module, "identity", vec![Ty::i32()], Ty::i32(), |b| {
        b.ret(Some(b.arg(0)));
    });

    module
}

/// Declarations that only reach native code through an alias.
pub fn native_routing() -> Module {
    let mut module = Module::new("native_routing");
    let triple = module.declare_function("triple", Ty::function(vec![Ty::i32()], Ty::i32(), false));
    module.add_intrinsic("triple", triple);
    let printf = module.declare_function(
        "printf",
        Ty::function(vec![Ty::i8().pointer_to()], Ty::i32(), true),
    );

    define(&mut module, "call_intrinsic", vec![], Ty::i32(), |b| {
        let arg = b.const_int(Ty::i32(), 14);
        let result = b.call(triple, vec![arg]).expect("triple returns a value");
        b.ret(Some(result));
    });

    define(&mut module, "print_greeting", vec![], Ty::i32(), |b| {
        let format = b.const_string("hello\n");
        let written = b.call(printf, vec![format]).expect("printf returns a value");
        b.ret(Some(written));
    });

    module
}

/// Adds one to the `i64` global and yields the new value.
fn increment(b: &mut FunctionBuilder, global: GlobalId) -> Operand {
    let current = b.global(global);
    let one = b.const_int(Ty::i64(), 1);
    let next = b.binary(OpKind::SignedAdd, current.clone(), one);
    b.store(next.clone(), current);
    next
}

/// A counter global bumped once by the global initializer.
pub fn globals() -> Module {
    let mut module = Module::new("globals");
    let five = module.const_int(Ty::i64(), 5);
    let counter = module.add_global("counter", Ty::i64(), Some(five));
    let greeting = module.add_string("hello");

    let init = define(&mut module, "init_globals", vec![], Ty::void(), |b| {
        increment(b, counter);
        b.ret(None);
    });
    module.set_global_init(init);

    define(&mut module, "bump", vec![], Ty::i64(), |b| {
        let next = increment(b, counter);
        b.ret(Some(next));
    });

    define(&mut module, "greeting_first", vec![], Ty::i8(), |b| {
        let text = Operand::Const(b.module().const_global_string(greeting));
        let first = b.read_ptr(text);
        b.ret(Some(first));
    });

    module
}

/// Calls into the C library loaded in the test process.
pub fn libc_calls() -> Module {
    let mut module = Module::new("libc_calls");
    let strlen = module.declare_function(
        "strlen",
        Ty::function(vec![Ty::i8().pointer_to()], Ty::u64(), false),
    );
    let snprintf = module.declare_function(
        "snprintf",
        Ty::function(
            vec![Ty::i8().mut_pointer_to(), Ty::u64(), Ty::i8().pointer_to()],
            Ty::i32(),
            true,
        ),
    );

    define(&mut module, "strlen_hello", vec![], Ty::u64(), |b| {
        let text = b.const_string("hello");
        let len = b.call(strlen, vec![text]).expect("strlen returns a value");
        b.ret(Some(len));
    });

    define(&mut module, "format_answer", vec![], Ty::u64(), |b| {
        let buffer = b.stack_alloc(Ty::array(Ty::i8(), 32));
        let buffer = b.cast(OpKind::CastPointerType, buffer, Ty::i8().mut_pointer_to());
        let size = b.const_int(Ty::u64(), 32);
        let format = b.const_string("%d-%s");
        let answer = b.const_int(Ty::i32(), 42);
        let suffix = b.const_string("ok");
        b.call(snprintf, vec![buffer.clone(), size, format, answer, suffix]);
        let text = b.cast(OpKind::CastPointerType, buffer, Ty::i8().pointer_to());
        let len = b.call(strlen, vec![text]).expect("strlen returns a value");
        b.ret(Some(len));
    });

    module
}
