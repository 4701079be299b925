use brkalloc::BrkAlloc;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let allocator = BrkAlloc::new();

    unsafe {
        let addr1 = allocator.allocate(64);
        log_alloc(addr1, 64);

        let addr2 = allocator.allocate_zeroed(10, 8);
        log_alloc(addr2, 80);

        // Growing moves the contents to a fresh block.
        addr1.write_bytes(0xAB, 64);
        let addr3 = allocator.reallocate(addr1, 256);
        log_alloc(addr3, 256);
        println!("First byte survived the move: {:#x}", *addr3);

        allocator.release(addr3);
        allocator.release(addr2);

        println!(
            "Blocks still registered: {} (heap end {:?})",
            allocator.block_count(),
            allocator.heap_end()
        );
    }
}
