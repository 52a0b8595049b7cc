#![no_main]

use std::collections::BTreeMap;

use agent_skills_sync::metadata::core_frontmatter;
use agent_skills_sync::{fingerprint, parse_frontmatter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok((frontmatter, body)) = parse_frontmatter(input) else {
        return;
    };

    let core = core_frontmatter(&frontmatter);
    let files = BTreeMap::new();
    let hash = fingerprint(&core, &body, &files);
    assert!(hash.starts_with("sha256-"));
    assert_eq!(hash, fingerprint(&core, &body, &files));
});
