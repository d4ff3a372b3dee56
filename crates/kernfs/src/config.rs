//! kernfs 配置常量

/// 文本属性读写缓冲区大小（单页）
pub const PAGE_SIZE: usize = 4096;

/// 节点名最大长度
pub const NAME_MAX: usize = 255;

/// 停用偏置
///
/// 停用时加到活动引用计数上，使计数变为负数，此后 `get_active` 一律失败。
/// 计数回落到该值即表示停用前取得的引用已全部释放。
pub const KERNFS_DEACTIVATED_BIAS: i32 = i32::MIN + 1;

/// 路径解析时允许跟随的符号链接数量上限
pub const SYMLINK_MAX_DEPTH: usize = 40;

/// 根目录的节点标识
pub const ROOT_ID: u64 = 1;
