// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for plan computation.
//!
//! The planner runs on every first request and after every failure, so
//! it must stay negligible next to a model load.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use device_detect::{DeviceKind, DeviceProfile};
use device_memory::ByteSize;
use distribution_planner::{DistributionPlanner, Tier};
use model_catalog::{ModelSpec, Precision};

fn devices(gpus: usize) -> Vec<DeviceProfile> {
    let mut list: Vec<DeviceProfile> = (0..gpus)
        .map(|i| {
            DeviceProfile::new(
                format!("cuda:{i}"),
                "bench GPU",
                DeviceKind::GpuVendorA,
                ByteSize::from_gb(4 + i as u64),
            )
        })
        .collect();
    list.push(DeviceProfile::cpu(ByteSize::from_gb(64)));
    list
}

fn bench_plan_tiers(c: &mut Criterion) {
    let planner = DistributionPlanner::default();
    let model = ModelSpec::from_parameter_count("bench-13b", 13_000_000_000, 40, 5120, Precision::F16);
    let list = devices(2);

    let mut group = c.benchmark_group("plan_13b_two_gpus");
    for tier in Tier::ALL {
        group.bench_function(tier.to_string(), |b| {
            b.iter(|| planner.plan(black_box(&model), black_box(&list), tier))
        });
    }
    group.finish();
}

fn bench_plan_many_devices(c: &mut Criterion) {
    let planner = DistributionPlanner::default();
    let model = ModelSpec::from_parameter_count("bench-70b", 70_000_000_000, 80, 8192, Precision::F16);
    let list = devices(16);

    c.bench_function("plan_70b_sixteen_gpus", |b| {
        b.iter(|| planner.plan(black_box(&model), black_box(&list), Tier::SingleDevice))
    });
}

criterion_group!(benches, bench_plan_tiers, bench_plan_many_devices);
criterion_main!(benches);
