//! Serial request path, end to end.
// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]
//!
//! Bytes enter through the receive-interrupt API, the poller
//! ([`Runtime::serve_pass`]) assembles lines, and the request task
//! ([`dispatch::pass`]) answers on the port the line came from. Replies are
//! captured by a shared in-memory wire per port.
//!
//! Run with: cargo test -p firmware --test integration_serial

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use firmware::audio::PdmPool;
use firmware::board::StatusLed;
use firmware::config::{NodeConfig, NODE_CONFIG};
use firmware::dispatch;
use firmware::sync::{TaskContext, TaskId, TaskSet};
use firmware::{MonotonicClock, Runtime};
use platform::mocks::{MockLed, MockSystem};
use platform::{PortId, UsbPresence};
use proptest::prelude::*;

/// One port's transmit line, readable after the runtime has taken its copy.
#[derive(Clone, Default)]
struct Wire(Arc<Mutex<Vec<u8>>>);

impl Wire {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl embedded_io::ErrorType for Wire {
    type Error = Infallible;
}

impl embedded_io_async::Write for Wire {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
}

fn wires() -> [Wire; PortId::COUNT] {
    core::array::from_fn(|_| Wire::default())
}

fn wire(wires: &[Wire; PortId::COUNT], port: PortId) -> &Wire {
    &wires[port.index()]
}

fn runtime<'a>(
    config: NodeConfig,
    clock: &'a MonotonicClock,
    tasks: &'a TaskSet<'a>,
    pool: &'a PdmPool,
    wires: &[Wire; PortId::COUNT],
) -> Runtime<'a, Wire> {
    Runtime::new(config, clock, tasks, pool, wires.clone(), UsbPresence::Absent)
}

/// What the receive interrupt does with a DMA chunk.
fn receive(rt: &Runtime<'_, Wire>, port: PortId, bytes: &[u8]) {
    rt.receive_from_isr(port, bytes);
}

async fn poll(rt: &Runtime<'_, Wire>) {
    let ctx = TaskContext::new(TaskId::Serial);
    rt.serve_pass(&ctx).await.unwrap();
}

async fn answer(rt: &Runtime<'_, Wire>, sys: &mut MockSystem) -> bool {
    let ctx = TaskContext::new(TaskId::Request);
    let mut led = StatusLed::new(MockLed::new());
    dispatch::pass(rt, &ctx, sys, &mut led).await.unwrap()
}

#[tokio::test]
async fn mem_report_comes_back_on_usart1() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
    tasks.register(TaskId::Serial, false);
    tasks.register(TaskId::Request, false);
    let mut sys = MockSystem::new();

    receive(&rt, PortId::Usart1, b"mem\r\n");
    poll(&rt).await;
    assert!(answer(&rt, &mut sys).await);

    let text = wire(&wires, PortId::Usart1).text();
    assert!(text.starts_with("tasks: U:serial R:request\r\n"), "{text}");
    assert!(text.contains("uptime: "));
    assert!(text.contains("spl: -"));
    assert!(text.ends_with("\r\n"));
    assert_eq!(wire(&wires, PortId::Lpuart1).text(), "");
}

#[tokio::test]
async fn back_to_back_lines_are_answered_in_order() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
    let mut sys = MockSystem::new();

    // Both lines in one DMA chunk: the second waits in the ring.
    receive(&rt, PortId::Usart1, b"trace on\rtrace off\r");
    poll(&rt).await;
    assert!(answer(&rt, &mut sys).await);
    assert!(rt.debug.is_enabled());

    poll(&rt).await;
    assert!(answer(&rt, &mut sys).await);
    assert!(!rt.debug.is_enabled());

    assert_eq!(
        wire(&wires, PortId::Usart1).text(),
        "trace is on\r\ntrace is off\r\n"
    );
}

#[tokio::test]
async fn each_port_gets_its_own_reply() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
    let mut sys = MockSystem::new();

    receive(&rt, PortId::Lpuart1, b"post\r");
    receive(&rt, PortId::Usart1, b"post\r");
    poll(&rt).await;
    assert!(answer(&rt, &mut sys).await);

    assert_eq!(
        wire(&wires, PortId::Lpuart1).text(),
        "diagnostics not allowed on this port\r\n"
    );
    assert_eq!(
        wire(&wires, PortId::Usart1).text(),
        "POST: 4 checks passed\r\n"
    );
}

#[tokio::test]
async fn disabled_port_is_never_served() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
    let mut sys = MockSystem::new();

    receive(&rt, PortId::Usart2, b"mem\r");
    poll(&rt).await;
    assert!(!answer(&rt, &mut sys).await);
    assert_eq!(wire(&wires, PortId::Usart2).text(), "");
}

#[tokio::test]
async fn restart_is_deferred_until_the_reply_is_out() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let config = NodeConfig {
        settle_ms: 1,
        ..NODE_CONFIG
    };
    let rt = runtime(config, &clock, &tasks, &pool, &wires);
    let mut sys = MockSystem::new();

    receive(&rt, PortId::Usart1, b"RESTART\r");
    poll(&rt).await;
    assert!(answer(&rt, &mut sys).await);
    assert_eq!(wire(&wires, PortId::Usart1).text(), "restarting\r\n");
    assert_eq!(sys.restarts, 1);
    assert_eq!(sys.bootloader_jumps, 0);
}

#[tokio::test]
async fn staged_trace_reaches_usb_once_attached() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
    rt.debug.set_enabled(true);

    rt.debug.stage_from_isr("rx overrun\r\n", tasks.isr());
    poll(&rt).await;
    // No host yet: staged text is dropped.
    assert_eq!(wire(&wires, PortId::Usb).text(), "");

    rt.usb.on_edge_from_isr(UsbPresence::Present, tasks.isr());
    rt.debug.stage_from_isr("vbus up\r\n", tasks.isr());
    poll(&rt).await;
    assert_eq!(wire(&wires, PortId::Usb).text(), "usb: attached\r\nvbus up\r\n");
}

#[tokio::test]
async fn receive_faults_are_traced_to_usb() {
    let clock = MonotonicClock::new();
    let tasks = TaskSet::new(&clock);
    let pool = PdmPool::new();
    let wires = wires();
    let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
    rt.usb.on_edge_from_isr(UsbPresence::Present, tasks.isr());
    poll(&rt).await;
    rt.debug.set_enabled(true);

    rt.receive_error_from_isr(PortId::Usart1);
    poll(&rt).await;
    assert_eq!(wire(&wires, PortId::Usb).text(), "usart1: rx error\r\n");

    // More than the receive ring holds, in one chunk.
    receive(&rt, PortId::Lpuart1, &[b'x'; 700]);
    poll(&rt).await;
    assert_eq!(
        wire(&wires, PortId::Usb).text(),
        "usart1: rx error\r\nlpuart1: rx overrun\r\n"
    );
}

fn split_points() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..=10, 0..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However the receive interrupt chunks a line, the reply is the same.
    #[test]
    fn chunking_does_not_change_the_reply(mut cuts in split_points()) {
        let line: &[u8] = b"trace off\r";
        cuts.sort_unstable();
        let rt_host = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let text = rt_host.block_on(async {
            let clock = MonotonicClock::new();
            let tasks = TaskSet::new(&clock);
            let pool = PdmPool::new();
            let wires = wires();
            let rt = runtime(NODE_CONFIG, &clock, &tasks, &pool, &wires);
            let mut sys = MockSystem::new();

            let mut start = 0;
            for cut in cuts.into_iter().chain([line.len()]) {
                let cut = cut.min(line.len());
                if cut > start {
                    receive(&rt, PortId::Usart1, &line[start..cut]);
                    poll(&rt).await;
                    start = cut;
                }
            }
            answer(&rt, &mut sys).await;
            wire(&wires, PortId::Usart1).text()
        });
        prop_assert_eq!(text, "trace is off\r\n");
    }
}
