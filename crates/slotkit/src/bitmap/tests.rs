use crate::{BitSlotAllocator, Error};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::scope;

fn allocator(start: i64, end: i64) -> BitSlotAllocator {
    BitSlotAllocator::new(start, end).unwrap()
}

fn assert_out_of_range<T: core::fmt::Debug>(result: crate::Result<T>, value: i64) {
    match result {
        Err(Error::OutOfRange { value: v, .. }) => assert_eq!(v, value),
        other => panic!("expected OutOfRange for {value}, got {other:?}"),
    }
}

#[test]
fn new_rejects_inverted_range() {
    assert_eq!(
        BitSlotAllocator::new(2, 1).unwrap_err(),
        Error::InvalidRange { start: 2, end: 1 }
    );
}

#[test]
fn new_accepts_single_value_and_large_ranges() {
    let single = allocator(7, 7);
    assert_eq!(single.len(), 1);
    assert_eq!(single.available(), 1);

    let wide = allocator(1, 300);
    assert_eq!(wide.len(), 300);
    assert_eq!(wide.available(), 300);
    assert_eq!(wide.start(), 1);
    assert_eq!(wide.end(), 300);
}

#[test]
fn new_rejects_range_wider_than_i64() {
    assert!(matches!(
        BitSlotAllocator::new(i64::MIN, i64::MAX),
        Err(Error::InvalidRange { .. })
    ));
}

#[test]
fn push_and_query_scenario() {
    let slots = allocator(1, 200);

    slots.push(20).unwrap();
    assert_eq!(slots.available(), 199);
    assert_eq!(slots.push(20).unwrap_err(), Error::AlreadyUsed { value: 20 });
    assert_out_of_range(slots.push(201), 201);
    assert_eq!(slots.available(), 199);

    assert!(slots.is_used(20).unwrap());
    assert!(!slots.is_used(21).unwrap());
}

#[test]
fn out_of_range_never_mutates() {
    let slots = allocator(10, 40);
    slots.push(15).unwrap();
    let before = slots.available();

    for value in [i64::MIN, -1, 0, 9, 41, 1_000, i64::MAX] {
        assert_out_of_range(slots.push(value), value);
        assert_out_of_range(slots.remove(value), value);
        assert_out_of_range(slots.is_used(value), value);
        assert_eq!(slots.available(), before);
    }
}

#[test]
fn double_push_counts_once() {
    let slots = allocator(0, 15);
    slots.push(3).unwrap();
    assert!(slots.push(3).is_err());
    assert_eq!(slots.available(), 15);
}

#[test]
fn double_remove_is_a_no_op() {
    let slots = allocator(0, 15);
    let before = slots.available();

    slots.push(9).unwrap();
    slots.remove(9).unwrap();
    assert_eq!(slots.available(), before);

    slots.remove(9).unwrap();
    assert_eq!(slots.available(), before);
    assert!(!slots.is_used(9).unwrap());
}

#[test]
fn bits_at_byte_boundaries() {
    // 38 values span five bytes with a partially used tail byte.
    let slots = allocator(1, 38);
    for value in [1, 8, 9, 16, 17, 24, 25, 32, 33, 38] {
        slots.push(value).unwrap();
        assert!(slots.is_used(value).unwrap());
    }
    assert_eq!(slots.available(), 28);
    assert_eq!(
        slots.used_values().unwrap(),
        vec![1, 8, 9, 16, 17, 24, 25, 32, 33, 38]
    );

    slots.remove(8).unwrap();
    assert!(!slots.is_used(8).unwrap());
    assert!(slots.is_used(9).unwrap());
}

#[test]
fn available_matches_set_bits_after_mixed_operations() {
    let slots = allocator(-50, 77);
    let mut expected = HashSet::new();

    // Deterministic pseudo-random walk over the range.
    let mut state = 0x2545_f491_u64;
    for _ in 0..2_000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let value = -50 + (state % 128) as i64;
        if state & 1 == 0 {
            let _ = slots.push(value);
            expected.insert(value);
        } else {
            slots.remove(value).unwrap();
            expected.remove(&value);
        }
        assert_eq!(slots.available(), slots.len() - expected.len() as i64);
    }

    let mut sorted: Vec<_> = expected.into_iter().collect();
    sorted.sort_unstable();
    assert_eq!(slots.used_values().unwrap(), sorted);
    assert_eq!(slots.used(), sorted.len() as i64);
}

#[test]
fn allocate_next_scans_forward_without_reserving() {
    let slots = allocator(100, 110);
    slots.push(100).unwrap();
    slots.push(102).unwrap();

    assert_eq!(slots.allocate_next().unwrap(), 101);
    assert_eq!(slots.cursor(), 2);
    // 101 was not reserved, but the cursor has moved past it.
    assert!(!slots.is_used(101).unwrap());
    assert_eq!(slots.allocate_next().unwrap(), 103);
    assert_eq!(slots.available(), 9);
}

#[test]
fn allocate_next_fails_when_full() {
    let slots = allocator(1, 3);
    for value in 1..=3 {
        slots.push(value).unwrap();
    }
    assert_eq!(slots.allocate_next().unwrap_err(), Error::Exhausted);
    assert_eq!(slots.cursor(), 0);
}

#[test]
fn allocate_next_does_not_revisit_slots_behind_cursor() {
    let slots = allocator(1, 3);
    assert_eq!(slots.allocate_next().unwrap(), 1);
    assert_eq!(slots.allocate_next().unwrap(), 2);
    assert_eq!(slots.allocate_next().unwrap(), 3);
    for value in 1..=3 {
        slots.push(value).unwrap();
    }
    assert_eq!(slots.allocate_next().unwrap_err(), Error::Exhausted);

    slots.remove(2).unwrap();
    assert_eq!(slots.available(), 1);
    assert_eq!(slots.allocate_next().unwrap_err(), Error::Exhausted);

    slots.reset_cursor().unwrap();
    assert_eq!(slots.allocate_next().unwrap(), 2);
}

#[test]
fn allocate_next_ignores_padding_bits() {
    // Ten values leave six padding bits in the second byte.
    let slots = allocator(0, 9);
    for value in 0..=8 {
        slots.push(value).unwrap();
    }
    assert_eq!(slots.allocate_next().unwrap(), 9);
    assert_eq!(slots.allocate_next().unwrap_err(), Error::Exhausted);
}

#[test]
fn reserve_next_marks_and_advances() {
    let slots = allocator(1, 20);
    slots.push(1).unwrap();

    assert_eq!(slots.reserve_next().unwrap(), 2);
    assert_eq!(slots.reserve_next().unwrap(), 3);
    assert!(slots.is_used(2).unwrap());
    assert!(slots.is_used(3).unwrap());
    assert_eq!(slots.available(), 17);
    assert_eq!(slots.cursor(), 3);
}

#[test]
fn allocate_is_push() {
    let slots = allocator(0, 4);
    slots.allocate(4).unwrap();
    assert!(slots.is_used(4).unwrap());
    assert_eq!(slots.allocate(4).unwrap_err(), Error::AlreadyUsed { value: 4 });
}

#[test]
fn uninitialized_allocator() {
    let slots = BitSlotAllocator::default();
    assert!(!slots.is_initialized());
    assert_eq!(slots.available(), 0);
    assert_eq!(slots.used(), 0);
    assert_eq!(slots.push(1).unwrap_err(), Error::Uninitialized);
    assert_eq!(slots.remove(1).unwrap_err(), Error::Uninitialized);
    assert_eq!(slots.is_used(1).unwrap_err(), Error::Uninitialized);
    assert_eq!(slots.allocate_next().unwrap_err(), Error::Uninitialized);
    assert_eq!(slots.reserve_next().unwrap_err(), Error::Uninitialized);
    assert_eq!(slots.reset_cursor().unwrap_err(), Error::Uninitialized);
}

#[test]
fn debug_output_omits_bits() {
    let slots = allocator(1, 16);
    slots.push(4).unwrap();
    let rendered = format!("{slots:?}");
    assert!(rendered.contains("available: 15"), "{rendered}");
    assert!(rendered.contains("cursor: 0"), "{rendered}");
    assert!(!rendered.contains("bits"), "{rendered}");
}

#[test]
fn concurrent_reserve_next_hands_out_unique_values() {
    const THREADS: usize = 8;
    const TOTAL: i64 = 4096;

    let slots = Arc::new(allocator(1, TOTAL));
    let seen = Arc::new(Mutex::new(HashSet::with_capacity(TOTAL as usize)));

    scope(|s| {
        for _ in 0..THREADS {
            let slots = Arc::clone(&slots);
            let seen = Arc::clone(&seen);
            s.spawn(move || {
                while let Ok(value) = slots.reserve_next() {
                    assert!(seen.lock().unwrap().insert(value));
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), TOTAL as usize);
    assert_eq!(slots.available(), 0);
    assert_eq!(slots.reserve_next().unwrap_err(), Error::Exhausted);
}

#[test]
fn concurrent_push_remove_keeps_count_consistent() {
    const THREADS: i64 = 8;
    const PER_THREAD: i64 = 256;

    let slots = Arc::new(allocator(0, THREADS * PER_THREAD - 1));

    scope(|s| {
        for t in 0..THREADS {
            let slots = Arc::clone(&slots);
            s.spawn(move || {
                let base = t * PER_THREAD;
                for value in base..base + PER_THREAD {
                    slots.push(value).unwrap();
                }
                for value in (base..base + PER_THREAD).step_by(2) {
                    slots.remove(value).unwrap();
                }
            });
        }
    });

    assert_eq!(slots.available(), THREADS * PER_THREAD / 2);
    assert_eq!(slots.used_values().unwrap().len() as i64, slots.used());
}
