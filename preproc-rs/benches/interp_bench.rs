use criterion::{black_box, criterion_group, criterion_main, Criterion};
use preproc::script::location::split_lines;
use preproc::script::stmt::parse_document;
use preproc::script::Interpreter;

fn make_doc(participants: usize) -> String {
    let mut doc = String::from(
        "\
@startuml
!procedure $arrow($from, $to, $label = \"call\")
$from -> $to : $label
!endprocedure
!function $pad($s, $n)
!while %strlen($s) < $n
!$s = \"0\" + $s
!endwhile
!return $s
!endfunction
",
    );
    doc.push_str("!$names = [");
    for i in 0..participants {
        if i > 0 {
            doc.push_str(", ");
        }
        doc.push_str(&format!("\"svc{i}\""));
    }
    doc.push_str("]\n");
    doc.push_str(
        "\
!foreach $n in $names
participant $n as \"$n (%upper($n))\"
!endfor
!$i = 0
!foreach $n in $names
$arrow(\"client\", $n, $label = $pad(%string($i), 4))
!$i = $i + 1
!endfor
@enduml
",
    );
    doc
}

fn bench_interp(c: &mut Criterion) {
    let small = make_doc(10);
    let large = make_doc(500);

    let mut g = c.benchmark_group("preprocess");

    g.bench_function("parse_small", |b| {
        let lines = split_lines(&small);
        b.iter(|| parse_document(black_box(&lines)))
    });
    g.bench_function("run_small", |b| {
        b.iter(|| Interpreter::default().run_text(black_box(&small)))
    });
    g.bench_function("run_large", |b| {
        b.iter(|| Interpreter::default().run_text(black_box(&large)))
    });

    g.finish();
}

criterion_group!(benches, bench_interp);
criterion_main!(benches);
