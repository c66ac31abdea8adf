/// Check — parse a story document and validate its references.
///
/// Usage: check <story_file.sdc> [...]
///
/// Exit status is nonzero if any file fails to parse or has an
/// unresolved reference.

use std::path::Path;
use std::process;

use storydoc::core::parser;
use storydoc::core::validate;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: check <story_file.sdc> [...]");
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let mut failed = false;
    for path in &args[1..] {
        match parser::parse_file(Path::new(path)) {
            Ok(story) => match validate::validate_references(&story) {
                Ok(()) => println!("OK: {}", path),
                Err(unresolved) => {
                    eprintln!("FAIL: {}: {}", path, unresolved);
                    failed = true;
                }
            },
            Err(e) => {
                eprintln!("FAIL: {}: {}", path, e);
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}
