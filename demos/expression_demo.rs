//! Example demonstrating expression trees, constant folding and list access

use laneql::context::{EvalState, EvaluationContext};
use laneql::corpus::SimpleCorpus;
use laneql::expression::{
    ArithmeticOp, ArrayLiteral, BinaryArithmetic, Comparison, ComparisonOp, Concat, Expression,
    IndexAccess, Literal, NaryLogical, SetMode, SetPredicate, StringMode,
};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("LaneQL Expression Engine Demo");
    println!("=============================");

    let ctx = EvaluationContext::builder()
        .corpus(Arc::new(SimpleCorpus::new()))
        .build()?;
    let mut state = EvalState::empty();

    // Example 1: arithmetic with constant folding
    println!("\n1. Arithmetic & Constant Folding");
    println!("--------------------------------");

    let sum = BinaryArithmetic::new(
        ArithmeticOp::Add,
        Box::new(Literal::int(3)),
        Box::new(Literal::int(4)),
    )?;
    let mut optimized = Box::new(sum).optimize(&ctx)?;
    println!("3 + 4 optimizes to a constant: {}", optimized.is_constant());
    println!("3 + 4 = {}", optimized.compute_int(&mut state)?);

    let mixed = BinaryArithmetic::new(
        ArithmeticOp::Div,
        Box::new(Literal::int(1)),
        Box::new(Literal::float(2.0)),
    )?;
    println!(
        "1 / 2.0 has type {} (floating operand wins)",
        mixed.result_type()
    );

    // Example 2: arrays and negative indices
    println!("\n2. Arrays & Negative Indices");
    println!("----------------------------");

    let mut access = IndexAccess::new(
        Box::new(ArrayLiteral::ints(vec![1, 2, 3, 4, 5])),
        Box::new(Literal::int(-2)),
    )?;
    println!("{{1,2,3,4,5}}[-2] = {}", access.compute_int(&mut state)?);

    // Example 3: set predicates
    println!("\n3. Set Predicates");
    println!("-----------------");

    let mut contains = SetPredicate::new(
        SetMode::Single,
        Box::new(Literal::int(2)),
        vec![
            Box::new(Literal::int(1)) as Box<dyn Expression>,
            Box::new(Literal::int(2)),
            Box::new(Literal::int(3)),
        ],
    )?;
    println!("2 in {{1,2,3}} = {}", contains.compute_bool(&mut state)?);

    let mut all_in = SetPredicate::new(
        SetMode::ExpandExhaustive,
        Box::new(ArrayLiteral::ints(vec![0, 2])),
        vec![
            Box::new(Literal::int(1)) as Box<dyn Expression>,
            Box::new(Literal::int(2)),
            Box::new(Literal::int(3)),
        ],
    )?;
    println!(
        "{{0,2}} all in {{1,2,3}} = {}",
        all_in.compute_bool(&mut state)?
    );

    // Example 4: text handling
    println!("\n4. Text Comparison & Concatenation");
    println!("----------------------------------");

    let ci = StringMode {
        unicode: true,
        case_insensitive: true,
    };
    let mut eq = Comparison::new(
        ComparisonOp::Eq,
        Box::new(Literal::text("Lemma")),
        Box::new(Literal::text("lemma")),
        ci,
    )?;
    println!(
        "\"Lemma\" == \"lemma\" (case-insensitive) = {}",
        eq.compute_bool(&mut state)?
    );

    let concat = Concat::new(vec![
        Box::new(Literal::text("lane")),
        Box::new(Literal::text("ql")),
    ])?;
    let mut folded = Box::new(concat).optimize(&ctx)?;
    println!("\"lane\" + \"ql\" = {:?}", folded.compute(&mut state)?);

    // Example 5: logical operators with early exit
    println!("\n5. Logical Operators");
    println!("--------------------");

    let mut and = NaryLogical::conjunction(
        vec![
            Box::new(Literal::boolean(true)) as Box<dyn Expression>,
            Box::new(Literal::boolean(false)),
            Box::new(Literal::boolean(true)),
        ],
        true,
    )?;
    println!(
        "true && false && true = {}",
        and.compute_bool(&mut state)?
    );

    ctx.dispose();
    println!("\nDemo completed!");
    Ok(())
}
