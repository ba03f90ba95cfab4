use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use mailtriage::directory::Directory;
use mailtriage::model::directory::{Group, Pic};

/// 500 groups of 200 members each, one leading PIC per group.
fn large_directory() -> Directory {
    let groups = (0..500)
        .map(|g| Group {
            id: format!("g{g:04}"),
            name: format!("Group {g}"),
            members: (0..200).map(|m| format!("user{g}-{m}@example.com")).collect(),
            pic: None,
            pic_email: None,
        })
        .collect();
    let pics = (0..500)
        .map(|p| Pic {
            id: format!("p{p:04}"),
            name: format!("Person {p}"),
            email: format!("person{p}@corp.com"),
            group_leaderships: [format!("g{p:04}")].into_iter().collect(),
        })
        .collect();
    Directory::new(groups, pics)
}

fn bench_resolve(c: &mut Criterion) {
    let directory = large_directory();

    c.bench_function("resolve_last_group", |b| {
        b.iter(|| directory.resolve(black_box("User499-150@Example.com")))
    });

    c.bench_function("resolve_no_match", |b| {
        b.iter(|| directory.resolve(black_box("stranger@nowhere.org")))
    });
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
