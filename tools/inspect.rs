/// Inspect — parse a story document and dump its contents.
///
/// Usage: inspect <story_file.sdc>

use std::path::Path;
use std::process;

use storydoc::core::parser;
use storydoc::schema::node::{Action, ActionKind, TimelineItem};
use storydoc::schema::story::StoryGraph;
use storydoc::schema::tag::TagKind;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: inspect <story_file.sdc>");
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    println!("Parsing file: {}\n", args[1]);
    let story = match parser::parse_file(Path::new(&args[1])) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("Error parsing file: {}", e);
            process::exit(1);
        }
    };
    println!("Parse successful!\n");

    print_global_vars(&story);
    print_tag_definitions(&story);
    print_chapters(&story);
    print_groups(&story);
    print_nodes(&story);
}

fn print_global_vars(story: &StoryGraph) {
    println!("=== GLOBAL VARIABLES ===");
    for var in story.global_variables() {
        println!("Variable: {}", var.name);
        println!("  Type: {}", var.value_type);
        println!("  Default: {}", var.default);
        println!();
    }
}

fn print_tag_definitions(story: &StoryGraph) {
    println!("=== TAG DEFINITIONS ===");
    for tag in story.tag_definitions() {
        println!("Tag: {}", tag.name);
        let kind = match tag.kind {
            TagKind::Single => "single",
            TagKind::KeyValue => "key-value",
        };
        println!("  Type: {}", kind);
        println!(
            "  Color: {}",
            if tag.color.is_empty() { "none" } else { &tag.color }
        );
        if tag.kind == TagKind::KeyValue {
            println!("  Keys: {}", tag.keys.join(", "));
        }
        println!();
    }
}

fn print_chapters(story: &StoryGraph) {
    println!("=== CHAPTERS ===");
    for chapter in story.chapters() {
        println!("Chapter {}: {}", chapter.id, chapter.name);
    }
    println!();
}

fn print_groups(story: &StoryGraph) {
    println!("=== GROUPS ===");
    for group in story.groups() {
        println!("Group {}: {}", group.id, group.name);
        println!("  Chapter: {}", group.chapter);
        println!("  Content: {}", group.content);
        let tags: Vec<String> = group
            .tags
            .iter()
            .map(|t| match (&t.key, &t.value) {
                (Some(key), Some(value)) => format!("{}({}: {})", t.tag, key, value),
                (Some(key), None) => format!("{}({})", t.tag, key),
                _ => t.tag.clone(),
            })
            .collect();
        println!("  Tags: {}", tags.join(", "));
        println!(
            "  Nodes: start={}, end={}, points={}",
            group.graph.start,
            group.graph.end,
            group.graph.points.len()
        );
        println!();
    }
}

fn print_nodes(story: &StoryGraph) {
    println!("=== NODES ===");
    for node in story.nodes() {
        println!("Node {}: {}", node.id, node.title);
        println!("  Content: {}", node.content);
        println!("  Timeline items: {}", node.timeline.len());
        for item in &node.timeline {
            match item {
                TimelineItem::Dialogue(dialogue) => {
                    println!("    Dialogue {}:", dialogue.label);
                    for line in &dialogue.lines {
                        println!("      {}: \"{}\"", line.speaker, line.text);
                    }
                }
                TimelineItem::Action(action) => print_action(action, 4),
            }
        }
        println!();
    }
}

fn print_action(action: &Action, indent: usize) {
    let pad = " ".repeat(indent);
    match &action.kind {
        ActionKind::Code(code) => {
            println!("{}Action {}: CODE (length={})", pad, action.label, code.len())
        }
        ActionKind::Goto { node } => {
            println!("{}Action {}: GOTO node {}", pad, action.label, node)
        }
        ActionKind::Exit(scope) => {
            println!("{}Action {}: EXIT {:?}", pad, action.label, scope)
        }
        ActionKind::Enter { group } => {
            println!("{}Action {}: ENTER group {}", pad, action.label, group)
        }
        ActionKind::Choice(options) => {
            println!("{}Action {}: CHOICE", pad, action.label);
            for (index, option) in options.iter().enumerate() {
                println!("{}  [{}] \"{}\"", pad, index, option.text);
                for sub in &option.actions {
                    print_action(sub, indent + 4);
                }
            }
        }
        ActionKind::Event(event) => {
            println!("{}Action {}: EVENT {:?}", pad, action.label, event)
        }
        ActionKind::Unknown(declared) => {
            println!("{}Action {}: UNKNOWN '{}'", pad, action.label, declared)
        }
    }
}
