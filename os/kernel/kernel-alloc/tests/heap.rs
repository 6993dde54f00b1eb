mod common;

use common::{BYPASS_LIMIT, FixedPhys, HostPhys};
use kernel_alloc::heap::{ChunkError, MIN_SLUBS_PER_CHUNK, NumaHeap, Order, SLUB_SIZE, SizeClass};
use kernel_alloc::numa::{NodeArena, NodeId};
use kernel_info::memory::{PAGE_SIZE, PhysWindow, PhysicalAddress};
use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::Barrier;

type Heap = NumaHeap<HostPhys, ()>;

const N0: NodeId = NodeId::new(0);
const N1: NodeId = NodeId::new(1);

fn heap(budgets: &[usize]) -> Heap {
    let nodes = NodeArena::with_nodes(budgets.len()).unwrap();
    NumaHeap::new(HostPhys::new(budgets), PhysWindow::IDENTITY, nodes)
}

/// Two nodes where node 1 falls back to node 0.
fn two_nodes(budgets: [usize; 2]) -> Heap {
    let mut heap = heap(&budgets);
    heap.nodes_mut().set_neighbors(N1, &[N1, N0]).unwrap();
    heap.nodes_mut().set_neighbors(N0, &[N0, N1]).unwrap();
    heap
}

fn order_of(size: usize) -> Order {
    SizeClass::of(size).order().unwrap()
}

/// Objects of `order` in one freshly carved slub.
fn objects_per_slub(order: Order) -> usize {
    let first = 16usize.next_multiple_of(order.size());
    (SLUB_SIZE - first) / order.size()
}

#[test]
fn first_allocation_slices_a_chunk_and_carves_one_slub() {
    let heap = heap(&[4]);
    let p = heap.alloc(32, N0).expect("allocation");

    assert_eq!(heap.physical().chunk_requests(), [N0]);
    assert_eq!(heap.reserved_slubs(N0), MIN_SLUBS_PER_CHUNK - 1);
    assert_eq!(
        heap.free_objects(N0, order_of(32)),
        objects_per_slub(order_of(32)) - 1
    );
    assert_eq!(unsafe { heap.owner_of(p) }, N0);
}

#[test]
fn alloc_free_round_trip() {
    let heap = heap(&[4]);
    let order = order_of(32);

    let p = heap.alloc(32, N0).unwrap();
    unsafe { p.as_ptr().write_bytes(0xab, 32) };
    let free_before = heap.free_objects(N0, order);

    unsafe { heap.free(p.as_ptr(), 32) };
    assert!(heap.is_free_on(N0, order, p));
    assert_eq!(heap.free_objects(N0, order), free_before + 1);

    // LIFO: the object just freed comes back first.
    assert_eq!(heap.alloc(32, N0), Some(p));
    assert_eq!(heap.free_objects(N0, order), free_before);
}

#[test]
fn objects_are_aligned_and_disjoint() {
    let heap = heap(&[4]);
    let sizes = [1usize, 16, 17, 24, 100, 512, 1000, 2048, 4096];
    let mut live: Vec<(usize, usize)> = Vec::new();

    for &size in &sizes {
        for _ in 0..3 {
            let order = order_of(size);
            let p = heap.alloc(size, N0).unwrap();
            let addr = p.as_ptr() as usize;
            assert_eq!(addr % order.size(), 0, "size {size} misaligned");
            assert!(
                live.iter().all(|&(a, len)| addr + order.size() <= a || a + len <= addr),
                "size {size} overlaps a live object"
            );
            unsafe { p.as_ptr().write_bytes(0x5a, size) };
            live.push((addr, order.size()));
        }
    }

    // one slub per size class, all from the single chunk
    let classes: HashSet<Order> = sizes.iter().map(|&s| order_of(s)).collect();
    assert_eq!(heap.physical().chunk_requests(), [N0]);
    assert_eq!(heap.reserved_slubs(N0), MIN_SLUBS_PER_CHUNK - classes.len());
}

#[test]
fn free_returns_objects_to_their_owner() {
    // node 1 has no memory of its own and borrows from node 0
    let heap = two_nodes([4, 0]);
    let order = order_of(64);

    let p = heap.alloc(64, N1).unwrap();
    assert_eq!(unsafe { heap.owner_of(p) }, N0);
    assert_eq!(heap.physical().chunk_requests(), [N1, N0]);

    let on_owner = heap.free_objects(N0, order);
    unsafe { heap.free(p.as_ptr(), 64) };

    assert!(heap.is_free_on(N0, order, p));
    assert!(!heap.is_free_on(N1, order, p));
    assert_eq!(heap.free_objects(N0, order), on_owner + 1);
    assert_eq!(heap.free_objects(N1, order), 0);
}

#[test]
fn neighbor_free_object_is_used_without_a_new_chunk() {
    let heap = two_nodes([1, 0]);
    let order = order_of(128);

    let p = heap.alloc(128, N0).unwrap();
    unsafe { heap.free(p.as_ptr(), 128) };
    let reserved = heap.reserved_slubs(N0);
    let free = heap.free_objects(N0, order);

    // node 1 tries (and fails) to get its own chunk, then takes node 0's
    // most recently freed object
    let q = heap.alloc(128, N1).unwrap();
    assert_eq!(q, p);
    assert_eq!(heap.physical().chunk_requests(), [N0, N1]);
    assert_eq!(heap.reserved_slubs(N0), reserved);
    assert_eq!(heap.free_objects(N0, order), free - 1);
}

#[test]
fn neighbor_reserve_is_carved_before_asking_for_memory() {
    let heap = two_nodes([1, 0]);
    heap.alloc(16, N0).unwrap();
    let reserved = heap.reserved_slubs(N0);

    let p = heap.alloc(4096, N1).unwrap();
    assert_eq!(unsafe { heap.owner_of(p) }, N0);
    assert_eq!(heap.reserved_slubs(N0), reserved - 1);
    assert_eq!(heap.physical().chunk_requests(), [N0, N1]);
}

#[test]
fn exhaustion_returns_none_and_changes_nothing() {
    let heap = two_nodes([0, 0]);

    assert_eq!(heap.alloc(64, N1), None);
    assert_eq!(heap.physical().chunk_requests(), [N1, N0]);
    for node in [N0, N1] {
        assert_eq!(heap.reserved_slubs(node), 0);
        for order in Order::all() {
            assert_eq!(heap.free_objects(node, order), 0);
        }
    }
    assert_eq!(heap.physical().live_blocks(), 0);
}

#[test]
fn single_node_does_not_wander() {
    // neighbor lists default to the node itself
    let heap = heap(&[0, 4]);
    assert_eq!(heap.alloc(64, N0), None);
    assert_eq!(heap.physical().chunk_requests(), [N0]);
}

#[test]
fn large_requests_bypass_the_slubs() {
    let heap = heap(&[4]);
    let size = 3 * PAGE_SIZE as usize;

    let p = heap.alloc(size, N0).unwrap();
    assert_eq!(p.as_ptr() as usize % PAGE_SIZE as usize, 0);
    assert!(heap.physical().chunk_requests().is_empty());
    assert_eq!(heap.physical().live_blocks(), 1);
    unsafe { p.as_ptr().write_bytes(0, size) };

    unsafe { heap.free(p.as_ptr(), size) };
    assert_eq!(heap.physical().live_blocks(), 0);

    assert_eq!(heap.alloc(BYPASS_LIMIT + 1, N0), None);
}

#[test]
fn allocate_chunk_fills_the_reserve() {
    let heap = heap(&[1]);
    assert_eq!(heap.allocate_chunk(N0), Ok(MIN_SLUBS_PER_CHUNK));
    assert_eq!(heap.reserved_slubs(N0), MIN_SLUBS_PER_CHUNK);
    assert_eq!(
        heap.allocate_chunk(N0),
        Err(ChunkError::OutOfMemory { node: N0 })
    );
    assert_eq!(heap.reserved_slubs(N0), MIN_SLUBS_PER_CHUNK);

    // carving does not need another chunk
    heap.alloc(256, N0).unwrap();
    assert_eq!(heap.physical().chunk_requests(), [N0, N0]);
}

#[test]
fn misaligned_chunk_is_returned_and_reported() {
    let chunk = 0x10_0000 + 8;
    let heap = NumaHeap::<_, ()>::new(
        FixedPhys::new(chunk, 0x20_0000),
        PhysWindow::IDENTITY,
        NodeArena::with_nodes(1).unwrap(),
    );

    assert_eq!(
        heap.allocate_chunk(N0),
        Err(ChunkError::Misaligned {
            addr: PhysicalAddress::new(chunk)
        })
    );
    assert_eq!(heap.reserved_slubs(N0), 0);
    assert_eq!(heap.physical().freed(), [PhysicalAddress::new(chunk)]);

    // the slub path sees the same failure and gives up cleanly
    assert_eq!(heap.alloc(64, N0), None);
    assert_eq!(heap.reserved_slubs(N0), 0);
    assert_eq!(heap.free_objects(N0, order_of(64)), 0);
    assert_eq!(heap.physical().freed().len(), 2);
}

#[test]
fn bypass_block_at_null_is_given_back() {
    let heap = NumaHeap::<_, ()>::new(
        FixedPhys::new(0x10_0000, 0),
        PhysWindow::IDENTITY,
        NodeArena::with_nodes(1).unwrap(),
    );

    assert_eq!(heap.alloc(3 * PAGE_SIZE as usize, N0), None);
    assert_eq!(heap.physical().freed(), [PhysicalAddress::new(0)]);
}

#[test]
#[should_panic(expected = "null pointer")]
fn freeing_null_panics() {
    let heap = heap(&[1]);
    unsafe { heap.free(std::ptr::null_mut(), 32) };
}

#[test]
#[should_panic(expected = "unknown NUMA node")]
fn unknown_locality_panics() {
    let heap = heap(&[1]);
    let _ = heap.alloc(32, NodeId::new(7));
}

#[test]
fn concurrent_alloc_and_free_keep_objects_private() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let heap = two_nodes([32, 32]);
    let sizes = [16usize, 48, 200, 1024, 4096];

    let start = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let (heap, start) = (&heap, &start);
            s.spawn(move || {
                start.wait();
                let node = if t % 2 == 0 { N0 } else { N1 };
                let tag = u8::try_from(t + 1).unwrap();
                let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
                for round in 0..ROUNDS {
                    let size = sizes[(round + t) % sizes.len()];
                    let p = heap.alloc(size, node).expect("heap exhausted");
                    unsafe { p.as_ptr().write_bytes(tag, size) };
                    live.push((p, size));

                    if live.len() > 16 {
                        let (p, size) = live.swap_remove(round % live.len());
                        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), size) };
                        assert!(bytes.iter().all(|&b| b == tag), "object was shared");
                        unsafe { heap.free(p.as_ptr(), size) };
                    }
                }
                for (p, size) in live {
                    unsafe { heap.free(p.as_ptr(), size) };
                }
            });
        }
    });

    // Everything is back on its owner's lists: every carved slub is whole
    // again, and carved plus reserved slubs account for every chunk.
    let requests = heap.physical().chunk_requests();
    for node in [N0, N1] {
        let chunks = requests.iter().filter(|&&n| n == node).count();
        let mut carved = 0;
        for order in Order::all() {
            let free = heap.free_objects(node, order);
            assert_eq!(free % objects_per_slub(order), 0, "{node}: {order:?} leaked");
            carved += free / objects_per_slub(order);
        }
        assert_eq!(
            carved + heap.reserved_slubs(node),
            chunks * MIN_SLUBS_PER_CHUNK
        );
    }
}
