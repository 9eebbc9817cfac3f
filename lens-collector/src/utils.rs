// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use futures::stream::{self, StreamExt};
use rand::Rng;
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Runs `f` over every item with at most `limit` futures in flight and
/// collects every result. One failing item never cancels its siblings.
pub async fn run_bounded<I, T, F, Fut, R>(items: I, limit: usize, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

/// A uniformly random delay within `range`.
pub fn jitter(range: &RangeInclusive<Duration>) -> Duration {
    let (low, high) = (range.start().as_millis(), range.end().as_millis());
    if high <= low {
        return *range.start();
    }
    let millis = rand::thread_rng().gen_range(low..=high);
    Duration::from_millis(millis as u64)
}
