use crate::support::{load_document_or_exit, parse_namespaces_or_exit, render_json_or_exit};
use interlace_check::PathQuery;
use interlace_kernel::QueryEngine;

pub fn run(document: String, expression: String, namespaces: Vec<String>, json_output: bool) {
    let document = load_document_or_exit(&document);
    let namespaces = parse_namespaces_or_exit(&namespaces);

    let value = PathQuery::new()
        .query(&document, &expression, &namespaces)
        .unwrap_or_else(|err| {
            eprintln!("error: {err}");
            std::process::exit(1);
        });

    if json_output {
        println!("{}", render_json_or_exit(&value, "query result"));
    } else {
        println!("{value}");
    }
}
