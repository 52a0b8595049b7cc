#![no_main]

use agent_skills_sync::{parse_frontmatter, render_skill};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok((frontmatter, body)) = parse_frontmatter(input) {
            if let Ok(rendered) = render_skill(&frontmatter, &body) {
                let _ = parse_frontmatter(&rendered);
            }
        }
        let wrapped = format!("---\n{}\n---\n", input);
        let _ = parse_frontmatter(&wrapped);
    }
});
