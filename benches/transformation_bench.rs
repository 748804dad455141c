//! Performance benchmarks for the compilation pipeline.

use chtl::config::Config;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn compile(source: &str, config: &Config) {
    let (_result, _reporter) = chtl::compile(source, "bench.chtl", config);
}

fn bench_simple_element(c: &mut Criterion) {
    let source = r#"div { class: "test"; text { Hello World } }"#;
    let config = Config::default();

    c.bench_function("simple_element", |b| {
        b.iter(|| compile(black_box(source), &config));
    });
}

fn bench_nested_elements(c: &mut Criterion) {
    let source = r#"
        div {
            class: "container";
            header {
                h1 { text { Title } }
                nav {
                    a { href: "/"; text { Home } }
                    a { href: "/about"; text { About } }
                }
            }
            main {
                p { text { Content here } }
            }
        }
    "#;
    let config = Config::default();

    c.bench_function("nested_elements", |b| {
        b.iter(|| compile(black_box(source), &config));
    });
}

fn bench_style_block(c: &mut Criterion) {
    let source = r#"
        div {
            style {
                .card { color: red; padding: 8px; }
                &:hover { color: blue; }
            }
            text { hi }
        }
    "#;
    let config = Config::default();

    c.bench_function("style_block", |b| {
        b.iter(|| compile(black_box(source), &config));
    });
}

fn bench_template_expansion(c: &mut Criterion) {
    let source = r#"
        [Template] @Style Btn { color: blue; padding: 4px; }
        [Template] @Element Card { div { style { @Style Btn; } text { card } } }
        div { @Element Card; }
    "#;
    let config = Config::default();

    c.bench_function("template_expansion", |b| {
        b.iter(|| compile(black_box(source), &config));
    });
}

fn bench_scaling_element_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("element_count_scaling");
    let config = Config::default();

    for count in [5, 10, 20, 50].iter() {
        let body = (0..*count)
            .map(|i| format!(r#"div {{ class: "item-{i}"; text {{ {i} }} }}"#))
            .collect::<Vec<_>>()
            .join(" ");
        let source = format!("div {{ {body} }}");

        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, s| {
            b.iter(|| compile(black_box(s), &config));
        });
    }

    group.finish();
}

fn bench_chtljs_lowering(c: &mut Criterion) {
    let source = r#"
        div {
            script {
                {{.x}}.listen({ click: fn });
                {{.y}}.animate({ duration: 300 });
                vir state { value: 1 };
            }
        }
    "#;
    let config = Config::default();

    c.bench_function("chtljs_lowering", |b| {
        b.iter(|| compile(black_box(source), &config));
    });
}

criterion_group!(
    benches,
    bench_simple_element,
    bench_nested_elements,
    bench_style_block,
    bench_template_expansion,
    bench_scaling_element_count,
    bench_chtljs_lowering,
);

criterion_main!(benches);
