/// Prescript Prelude: the tiny, language-native script that runs inside
/// the child immediately before user code. Both preludes are shipped as
/// verbatim text assets embedded into the binary at build time, never
/// read from disk at runtime (that would expand the trusted path set).
///
/// The heavy lifting — `no_new_privs`, privilege drop, and seccomp
/// filter installation — happens in the host's `pre_exec` hook (see
/// `process_runner`) immediately before `execve` into the interpreter,
/// which is what actually satisfies the ordering requirement "filter
/// installation must precede code evaluation": the filter is sealed
/// before the interpreter's first bytecode runs. The prelude script
/// itself only emits the sentinel and then decodes and evaluates the
/// caller's code — and, per the resolved injection-hazard open
/// question, both languages receive their source as a base64 blob
/// rather than a literal embedded in generated source text, since
/// base64's alphabet cannot terminate a string literal early.
use base64::Engine;

/// Emitted by both preludes immediately after they start running (i.e.
/// immediately after privilege drop and filter install have already
/// taken effect on the host side). Everything the child writes before
/// this line is diagnostic; everything after is the user program's own
/// output.
pub const SENTINEL: &str = "__SANDBOXD_READY__";

const PYTHON_PRELUDE_TEMPLATE: &str = include_str!("assets/python_prelude.py");
const NODE_PRELUDE_TEMPLATE: &str = include_str!("assets/node_prelude.js");

const PLACEHOLDER: &str = "__SANDBOXD_B64_SOURCE__";

fn render(template: &str, source_code: &[u8]) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(source_code);
    template.replacen(PLACEHOLDER, &encoded, 1).into_bytes()
}

/// Render the Python prelude with `source_code` base64-embedded.
pub fn render_python_script(source_code: &[u8]) -> Vec<u8> {
    render(PYTHON_PRELUDE_TEMPLATE, source_code)
}

/// Render the Node.js prelude with `source_code` base64-embedded.
pub fn render_node_script(source_code: &[u8]) -> Vec<u8> {
    render(NODE_PRELUDE_TEMPLATE, source_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_script_round_trips_source_through_base64() {
        let source = b"print('hello')";
        let script = render_python_script(source);
        let text = String::from_utf8(script).unwrap();
        assert!(!text.contains(PLACEHOLDER));
        let encoded = base64::engine::general_purpose::STANDARD.encode(source);
        assert!(text.contains(&encoded));
    }

    #[test]
    fn node_script_round_trips_source_through_base64() {
        let source = b"console.log(1+1)";
        let script = render_node_script(source);
        let text = String::from_utf8(script).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(source);
        assert!(text.contains(&encoded));
    }

    #[test]
    fn base64_alphabet_cannot_break_out_of_the_literal() {
        // Source containing quotes and backslashes must not corrupt the
        // generated script, because it never appears unescaped.
        let hostile = b"'; import os; os.system('rm -rf /'); x = '";
        let script = render_python_script(hostile);
        let text = String::from_utf8(script).unwrap();
        assert!(!text.contains("os.system"));
    }

    #[test]
    fn both_preludes_emit_the_sentinel() {
        let py = String::from_utf8(render_python_script(b"pass")).unwrap();
        let node = String::from_utf8(render_node_script(b"0")).unwrap();
        assert!(py.contains(SENTINEL));
        assert!(node.contains(SENTINEL));
    }
}
