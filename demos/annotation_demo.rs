//! Example demonstrating context scopes, annotation access and per-worker
//! duplication

use laneql::context::EvaluationContext;
use laneql::corpus::{AnnotationInfo, ElementInfo, Item, SimpleCorpus};
use laneql::expression::{annotation_access, Expression, Literal, RegexMatch, Value};
use laneql::types::{MemberKind, TypeInfo};
use std::sync::Arc;
use std::thread;

struct Token {
    form: &'static str,
    pos: i64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("LaneQL Annotation Access Demo");
    println!("=============================");

    // A tiny in-memory corpus with two annotations on the token layer.
    let corpus = SimpleCorpus::new()
        .with_layer("tokens")
        .with_annotation(AnnotationInfo::integer("pos", |item| {
            item.downcast_ref::<Token>().map(|t| t.pos).unwrap_or(0)
        }))
        .with_annotation(AnnotationInfo::generic(
            "form",
            TypeInfo::Text,
            |item| Value::text(item.downcast_ref::<Token>().map(|t| t.form).unwrap_or("")),
        )?);

    // Root → lane → element scopes for one compilation session.
    let root = EvaluationContext::builder().corpus(Arc::new(corpus)).build()?;
    let lane = root.lane_builder().lane_named("tokens").build()?;
    let element = lane
        .element_builder()
        .element(ElementInfo::new(MemberKind::Item, vec![]))
        .build()?;
    let slot = element.item_slot().expect("element scope has an item slot");

    // pos lookup against a single item.
    let mut pos = annotation_access(&element, "pos")?;
    let mut state = element.new_state()?;
    state.set_item(slot, Item::new(Token { form: "run", pos: 11 }));
    println!("\npos(run) = {}", pos.compute_int(&mut state)?);

    // A regex match over the form annotation, duplicated per worker.
    let matcher = RegexMatch::new(
        annotation_access(&element, "form")?,
        Box::new(Literal::text("^r.*")),
        element.string_mode(),
    )?;

    let tokens: [&[(&'static str, i64)]; 2] = [
        &[("run", 11), ("walk", 12)],
        &[("rest", 13), ("sleep", 14)],
    ];
    let mut workers = Vec::new();
    for batch in tokens {
        let mut dup = matcher.duplicate(&element)?;
        let mut state = element.new_state()?;
        workers.push(thread::spawn(move || {
            batch
                .iter()
                .map(|&(form, pos)| {
                    state.set_item(slot, Item::new(Token { form, pos }));
                    (form, dup.compute_bool(&mut state).unwrap_or(false))
                })
                .collect::<Vec<_>>()
        }));
    }
    println!("\nform matches ^r.* per worker:");
    for worker in workers {
        for (form, matched) in worker.join().expect("worker panicked") {
            println!("  {:<6} -> {}", form, matched);
        }
    }

    root.dispose();
    println!("\nDemo completed!");
    Ok(())
}
