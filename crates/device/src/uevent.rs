//! 热插拔事件
//!
//! 设备加入、移除、绑定和解绑时，核心会向已注册的 [`UeventHandler`] 派发事件。
//! 向 `uevent` 属性写入动作名可以人为合成一次事件。

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::device::Device;

/// 事件动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeventAction {
    /// 对象已加入
    Add,
    /// 对象已移除
    Remove,
    /// 对象状态变化
    Change,
    /// 对象已移动
    Move,
    /// 上线
    Online,
    /// 下线
    Offline,
    /// 驱动已绑定
    Bind,
    /// 驱动已解绑
    Unbind,
}

impl UeventAction {
    /// 动作名
    pub fn as_str(&self) -> &'static str {
        match self {
            UeventAction::Add => "add",
            UeventAction::Remove => "remove",
            UeventAction::Change => "change",
            UeventAction::Move => "move",
            UeventAction::Online => "online",
            UeventAction::Offline => "offline",
            UeventAction::Bind => "bind",
            UeventAction::Unbind => "unbind",
        }
    }

    /// 解析动作名，忽略首尾空白
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "add" => UeventAction::Add,
            "remove" => UeventAction::Remove,
            "change" => UeventAction::Change,
            "move" => UeventAction::Move,
            "online" => UeventAction::Online,
            "offline" => UeventAction::Offline,
            "bind" => UeventAction::Bind,
            "unbind" => UeventAction::Unbind,
            _ => return None,
        })
    }
}

/// 事件接收者
pub trait UeventHandler: Send + Sync {
    /// 处理一次事件，`env` 的每一项形如 `KEY=value`
    fn uevent(&self, action: UeventAction, devpath: &str, env: &[String]);
}

/// 设备自身的环境变量：驱动名以及总线、类追加的变量
pub(crate) fn device_env(dev: &Device) -> Vec<String> {
    let mut env = Vec::new();
    if let Some(drv) = dev.driver() {
        env.push(format!("DRIVER={}", drv.name()));
    }
    if let Some(bus) = dev.bus() {
        if let Err(e) = bus.ops().uevent(dev, &mut env) {
            log::debug!("{}: bus uevent() returned {:?}", dev.name(), e);
        }
    }
    if let Some(class) = dev.class() {
        if let Err(e) = class.ops().dev_uevent(dev, &mut env) {
            log::debug!("{}: class uevent() returned {:?}", dev.name(), e);
        }
    }
    env
}
