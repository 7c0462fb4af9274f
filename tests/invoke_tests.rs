// Call-site lowering: dispatch classification, receiver and argument
// adaptation, constructor fusion.

mod common;

use classlift::ast::{CastKind, DispatchKind, Expr, MethodKind, StmtKind};
use classlift::classfile::{Instruction, InvokeKind, MethodRef, Type};
use classlift::Error;

use common::*;

fn invoke(kind: InvokeKind, owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::Invoke {
        kind,
        method: MethodRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        },
    }
}

fn sole_call(ast: &classlift::ast::MethodAst) -> &Expr {
    ast.body
        .iter()
        .find_map(|stmt| match &stmt.kind {
            StmtKind::Assign { value, .. } if matches!(value, Expr::Call { .. } | Expr::Cast { .. }) => {
                match value {
                    Expr::Cast { expr, .. } if matches!(**expr, Expr::Call { .. }) => Some(&**expr),
                    Expr::Call { .. } => Some(value),
                    _ => None,
                }
            }
            StmtKind::Expr(value @ Expr::Call { .. }) => Some(value),
            _ => None,
        })
        .expect("no call in the lowered body")
}

#[test]
fn static_call_is_direct_with_no_receiver() {
    // static int max2(int a, int b): iload_0; iload_1; Math.max; ireturn
    let method = static_method(
        "max2",
        "(II)I",
        body(2, vec![
            iload(0),
            iload(1),
            invoke(InvokeKind::Static, "java/lang/Math", "max", "(II)I"),
            ireturn(),
        ]),
    );
    let ast = lower_ok(&method);

    match sole_call(&ast) {
        Expr::Call { target, receiver, args } => {
            assert_eq!(target.kind, MethodKind::Static);
            assert_eq!(target.dispatch, DispatchKind::Direct);
            assert!(receiver.is_none());
            // First argument sits deeper on the stack.
            assert!(matches!(args[0], Expr::Var(v) if ast.var(v).id == "s_0_I"));
            assert!(matches!(args[1], Expr::Var(v) if ast.var(v).id == "s_1_I"));
        }
        other => panic!("expected a call, found {:?}", other),
    }
}

#[test]
fn virtual_receiver_is_reinterpreted_to_the_owner() {
    let method = static_method(
        "len",
        "(Ljava/lang/String;)I",
        body(1, vec![
            aload(0),
            invoke(InvokeKind::Virtual, "java/lang/String", "length", "()I"),
            ireturn(),
        ]),
    );
    let ast = lower_ok(&method);

    match sole_call(&ast) {
        Expr::Call { target, receiver, .. } => {
            assert_eq!(target.kind, MethodKind::InstanceVirtual);
            assert_eq!(target.dispatch, DispatchKind::Virtual);
            match receiver.as_deref() {
                Some(Expr::Cast { kind, ty, .. }) => {
                    assert_eq!(*kind, CastKind::Reinterpret);
                    assert_eq!(*ty, Type::Reference("java/lang/String".to_string()));
                }
                other => panic!("receiver must narrow to the owner, found {:?}", other),
            }
        }
        other => panic!("expected a call, found {:?}", other),
    }
}

#[test]
fn object_owned_receiver_needs_no_cast() {
    let method = static_method(
        "hash",
        "(Ljava/lang/Object;)I",
        body(1, vec![
            aload(0),
            invoke(InvokeKind::Virtual, "java/lang/Object", "hashCode", "()I"),
            ireturn(),
        ]),
    );
    let ast = lower_ok(&method);

    match sole_call(&ast) {
        Expr::Call { receiver, .. } => {
            assert!(matches!(receiver.as_deref(), Some(Expr::Var(_))));
        }
        other => panic!("expected a call, found {:?}", other),
    }
}

#[test]
fn interface_call_dispatches_virtually() {
    let method = static_method(
        "count",
        "(Ljava/util/List;)I",
        body(1, vec![
            aload(0),
            invoke(InvokeKind::Interface, "java/util/List", "size", "()I"),
            ireturn(),
        ]),
    );
    let ast = lower_ok(&method);

    match sole_call(&ast) {
        Expr::Call { target, .. } => {
            assert_eq!(target.kind, MethodKind::InstanceVirtual);
            assert_eq!(target.dispatch, DispatchKind::Virtual);
        }
        other => panic!("expected a call, found {:?}", other),
    }
}

#[test]
fn special_call_is_non_virtual_and_void_calls_become_statements() {
    let method = instance_method(
        "run",
        "()V",
        body(1, vec![
            aload(0),
            invoke(InvokeKind::Special, CLASS, "helper", "()V"),
            vreturn(),
        ]),
    );
    let ast = lower_ok(&method);

    let stmt = ast
        .body
        .iter()
        .find_map(|stmt| match &stmt.kind {
            StmtKind::Expr(call @ Expr::Call { .. }) => Some(call),
            _ => None,
        })
        .expect("a void call lowers to an expression statement");
    match stmt {
        Expr::Call { target, .. } => {
            assert_eq!(target.kind, MethodKind::InstanceNonVirtual);
            assert_eq!(target.dispatch, DispatchKind::Direct);
        }
        other => panic!("expected a call, found {:?}", other),
    }
}

#[test]
fn constructor_through_the_wrong_opcode_is_malformed() {
    let method = instance_method(
        "bad",
        "()V",
        body(1, vec![
            aload(0),
            invoke(InvokeKind::Virtual, CLASS, "<init>", "()V"),
            vreturn(),
        ]),
    );
    let err = lower(&method).expect_err("constructors require invokespecial");
    assert!(matches!(err, Error::MalformedBody { .. }));
}

#[test]
fn boolean_return_value_widens_at_the_assignment() {
    let method = static_method(
        "oddBit",
        "(I)I",
        body(1, vec![
            iload(0),
            invoke(InvokeKind::Static, CLASS, "odd", "(I)Z"),
            ireturn(),
        ]),
    );
    let ast = lower_ok(&method);

    let widened = ast.body.iter().any(|stmt| {
        matches!(
            &stmt.kind,
            StmtKind::Assign { value: Expr::Cast { kind: CastKind::Reinterpret, ty: Type::Int, expr }, .. }
                if matches!(**expr, Expr::Call { .. })
        )
    });
    assert!(widened, "boolean call result must widen to the int stack slot");
    assert_boolean_integrity(&ast);
}

#[test]
fn boolean_and_reference_arguments_narrow_to_their_parameter_types() {
    // Demo.record(boolean, String) called with an int and an Object-width
    // stack value.
    let method = static_method(
        "forward",
        "(ILjava/lang/String;)V",
        body(2, vec![
            iload(0),
            aload(1),
            invoke(InvokeKind::Static, CLASS, "record", "(ZLjava/lang/String;)V"),
            vreturn(),
        ]),
    );
    let ast = lower_ok(&method);

    match sole_call(&ast) {
        Expr::Call { args, .. } => {
            match &args[0] {
                Expr::Cast { kind, ty, .. } => {
                    assert_eq!(*kind, CastKind::Reinterpret);
                    assert_eq!(*ty, Type::Boolean);
                }
                other => panic!("boolean argument must narrow, found {:?}", other),
            }
            match &args[1] {
                Expr::Cast { kind, ty, .. } => {
                    assert_eq!(*kind, CastKind::Reinterpret);
                    assert_eq!(*ty, Type::Reference("java/lang/String".to_string()));
                }
                other => panic!("reference argument must narrow, found {:?}", other),
            }
        }
        other => panic!("expected a call, found {:?}", other),
    }
}

#[test]
fn array_owner_parses_as_a_descriptor() {
    // clone() invoked directly on an int[] receiver.
    let method = static_method(
        "copy",
        "([I)Ljava/lang/Object;",
        body(1, vec![
            aload(0),
            invoke(InvokeKind::Virtual, "[I", "clone", "()Ljava/lang/Object;"),
            areturn(),
        ]),
    );
    let ast = lower_ok(&method);

    match sole_call(&ast) {
        Expr::Call { receiver, .. } => match receiver.as_deref() {
            Some(Expr::Cast { ty, .. }) => assert_eq!(*ty, Type::Int.array_of()),
            other => panic!("array receiver must cast to int[], found {:?}", other),
        },
        other => panic!("expected a call, found {:?}", other),
    }
}
