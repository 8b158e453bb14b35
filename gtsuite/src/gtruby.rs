//! Built-in cases for the Ruby bindings.

use gtsuite_harness::{CompareOptions, Guard, Invocation, Registry, RegistryError, TestCase};

/// Keyword carried by every Ruby binding case.
pub(crate) const KEYWORD: &str = "gt_ruby";

/// Feature flag signalling that the optional view library was built.
pub(crate) const LIBGTVIEW: &str = "libgtview";

const SHORT_GFF3: &str = "${testdata}/gff3_file_1_short.txt";
const SHORT_GFF3_SORTED: &str = "gff3_file_1_short_sorted.txt";

fn ruby(script: &str) -> Invocation {
    Invocation::new("${ruby}").arg(format!("${{testdata}}/gtruby/{script}"))
}

fn case(name: &str) -> TestCase {
    TestCase::new(format!("gtruby: {name}")).keyword(KEYWORD)
}

/// Runs `script` on the short GFF3 fixture and checks its sorted output.
fn sorted_stream_case(name: &str, script: &str) -> TestCase {
    case(name)
        .then_capture(ruby(script).arg(SHORT_GFF3))
        .then_capture(Invocation::new("sort").stdin_from_last())
        .then_compare(SHORT_GFF3_SORTED)
}

/// Registers the Ruby binding cases, in declaration order.
pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(sorted_stream_case(
        "genome_stream bindings (output stream)",
        "gff3.rb",
    ))?;
    registry.register(sorted_stream_case(
        "genome_visitor bindings (output stream)",
        "genome_visitor.rb",
    ))?;

    registry.register_guarded(
        &Guard::feature(LIBGTVIEW),
        [
            case("feature_index and feature_stream bindings")
                .then_capture(ruby("feature_stuff.rb").arg("${testdata}"))
                .then_capture(Invocation::new("sort").stdin_from_last())
                .then_compare_with(
                    SHORT_GFF3_SORTED,
                    CompareOptions::default().excluding("^##sequence-region"),
                ),
            case("libgtview bindings").then_run(ruby("view.rb").args(["test.png", SHORT_GFF3])),
            case("show_seqids")
                .then_capture(
                    ruby("show_seqids.rb").arg("${testdata}/encode_known_genes_Mar07.gff3"),
                )
                .then_compare("encode_known_genes_Mar07.seqids"),
        ],
    )
}
