//! Bundled example scripts, selectable from the UI or with `--example`.

pub struct ExampleScript {
    pub name: &'static str,
    pub source: &'static str,
}

pub const EXAMPLES: &[ExampleScript] = &[
    ExampleScript {
        name: "hello_world",
        source: include_str!("../example-scripts/hello_world.rhai"),
    },
    ExampleScript {
        name: "fibonacci",
        source: include_str!("../example-scripts/fibonacci.rhai"),
    },
    ExampleScript {
        name: "primes",
        source: include_str!("../example-scripts/primes.rhai"),
    },
    ExampleScript {
        name: "infinite_loop",
        source: include_str!("../example-scripts/infinite_loop.rhai"),
    },
];

/// The buffer contents when nothing else seeds the editor.
pub fn initial_script() -> &'static str {
    EXAMPLES[0].source
}

pub fn find(name: &str) -> Option<&'static ExampleScript> {
    EXAMPLES.iter().find(|e| e.name == name)
}

pub fn names() -> Vec<&'static str> {
    EXAMPLES.iter().map(|e| e.name).collect()
}
