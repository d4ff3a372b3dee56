// Unit tests for sync.
//
// 这些测试在宿主机上用标准 `cargo test` 运行，需要 std 线程。

mod locks;
mod wait_counter;
