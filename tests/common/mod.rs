#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use niimprint::protocol::{HEADER, cmd, decode, encode};
use niimprint::{ListenerSlot, NotificationListener, Packet, Result, Transport};
use tokio::sync::oneshot;

pub type Responder = Box<dyn FnMut(&Packet) -> Vec<Vec<u8>> + Send>;

/// In-memory printer. Parses every complete packet written to it and queues
/// whatever the responder returns as notifications. Image packets are
/// acknowledged with `IMAGE_RECEIVED` at the end of the write that completes
/// them.
#[derive(Clone)]
pub struct MockPrinter {
    state: Arc<Mutex<State>>,
}

struct State {
    responder: Responder,
    written: Vec<u8>,
    writes: Vec<usize>,
    pending: Vec<u8>,
    requests: Vec<Packet>,
    outbox: VecDeque<Vec<u8>>,
    listener: Option<oneshot::Sender<Vec<u8>>>,
    image_unacked: bool,
    image_acks: usize,
    closed: bool,
}

impl MockPrinter {
    pub fn new(responder: impl FnMut(&Packet) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                responder: Box::new(responder),
                written: Vec::new(),
                writes: Vec::new(),
                pending: Vec::new(),
                requests: Vec::new(),
                outbox: VecDeque::new(),
                listener: None,
                image_unacked: false,
                image_acks: 0,
                closed: false,
            })),
        }
    }

    /// A well behaved D11 that finishes printing after `polls_before_done` status queries.
    pub fn d11(polls_before_done: usize) -> Self {
        let mut device = FakeD11::new(polls_before_done);
        Self::new(move |packet| device.respond(packet))
    }

    /// Never answers.
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Queues a notification; it goes to the current or next listener.
    pub fn queue(&self, raw: Vec<u8>) {
        let mut state = self.lock();
        state.outbox.push_back(raw);
        state.deliver();
    }

    pub fn requests(&self) -> Vec<Packet> {
        self.lock().requests.clone()
    }

    /// Command codes received, in order, image lines left out.
    pub fn commands(&self) -> Vec<u8> {
        self.lock()
            .requests
            .iter()
            .map(|p| p.command)
            .filter(|c| !is_image(*c))
            .collect()
    }

    pub fn image_packets(&self) -> Vec<Packet> {
        self.lock().requests.iter().filter(|p| is_image(p.command)).cloned().collect()
    }

    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Size of each write call.
    pub fn writes(&self) -> Vec<usize> {
        self.lock().writes.clone()
    }

    pub fn image_acks(&self) -> usize {
        self.lock().image_acks
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn deliver(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        if let Some(tx) = self.listener.take() {
            if tx.is_closed() {
                return;
            }
            if let Some(raw) = self.outbox.pop_front() {
                let _ = tx.send(raw);
            }
        }
    }

    fn parse_pending(&mut self) {
        loop {
            if self.pending.len() < 2 {
                return;
            }
            if self.pending[..2] != HEADER {
                self.pending.remove(0);
                continue;
            }
            if self.pending.len() < 4 {
                return;
            }
            let total = self.pending[3] as usize + 7;
            if self.pending.len() < total {
                return;
            }
            let frame: Vec<u8> = self.pending.drain(..total).collect();
            let packet = decode(&frame).expect("mock received a malformed packet");
            if is_image(packet.command) {
                self.image_unacked = true;
            }
            let responses = (self.responder)(&packet);
            self.requests.push(packet);
            self.outbox.extend(responses);
        }
    }
}

#[async_trait]
impl Transport for MockPrinter {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state.written.extend_from_slice(data);
        state.writes.push(data.len());
        state.pending.extend_from_slice(data);
        state.parse_pending();
        if state.image_unacked && state.pending.is_empty() {
            state.image_unacked = false;
            state.image_acks += 1;
            state.outbox.push_back(encode(cmd::IMAGE_RECEIVED, &[1]));
        }
        state.deliver();
        Ok(())
    }

    fn on_notification(&self) -> NotificationListener {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        state.listener = Some(tx);
        state.deliver();
        rx
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

pub fn is_image(command: u8) -> bool {
    matches!(command, cmd::IMAGE_SET | cmd::IMAGE_CLEAR | cmd::IMAGE_DATA)
}

/// Device model answering the print job command set.
pub struct FakeD11 {
    quantity: u16,
    polls_before_done: usize,
    polls: usize,
}

impl FakeD11 {
    pub fn new(polls_before_done: usize) -> Self {
        Self {
            quantity: 1,
            polls_before_done,
            polls: 0,
        }
    }

    pub fn respond(&mut self, packet: &Packet) -> Vec<Vec<u8>> {
        match packet.command {
            cmd::SET_LABEL_TYPE | cmd::SET_LABEL_DENSITY | cmd::ALLOW_PRINT_CLEAR => {
                vec![encode(packet.command + 16, &[1])]
            },
            cmd::SET_QUANTITY => {
                self.quantity = u16::from_be_bytes([packet.payload[0], packet.payload[1]]);
                vec![encode(cmd::SET_QUANTITY + 1, &[1])]
            },
            cmd::GET_PRINT_STATUS => {
                self.polls += 1;
                let page = if self.polls > self.polls_before_done { self.quantity } else { 0 };
                let [hi, lo] = page.to_be_bytes();
                vec![encode(cmd::GET_PRINT_STATUS + 16, &[hi, lo, 100, 100])]
            },
            cmd::GET_INFO => {
                let info = packet.payload[0];
                vec![encode(cmd::GET_INFO + info, &[0x01, info])]
            },
            c if is_image(c) => Vec::new(),
            c => vec![encode(c.wrapping_add(1), &[1])],
        }
    }
}

pub type WriteScript = Box<dyn FnMut(usize, &[u8]) -> Vec<Vec<u8>> + Send>;

/// Transport built on [`ListenerSlot`], like the BLE one. Notifications
/// scripted for a write are dispatched from a separate task, and every
/// write yields once so that task can run mid-transfer.
#[derive(Clone)]
pub struct SlotTransport {
    slot: Arc<ListenerSlot>,
    script: Arc<Mutex<WriteScript>>,
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SlotTransport {
    /// `script` gets the index of each write and its bytes, and returns the
    /// raw notifications the device pushes in reaction.
    pub fn new(script: impl FnMut(usize, &[u8]) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        Self {
            slot: Arc::new(ListenerSlot::new()),
            script: Arc::new(Mutex::new(Box::new(script))),
            chunks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn slot(&self) -> &ListenerSlot {
        &self.slot
    }
}

#[async_trait]
impl Transport for SlotTransport {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let index = {
            let mut chunks = self.chunks.lock().unwrap();
            chunks.push(data.to_vec());
            chunks.len() - 1
        };
        let notifications = (self.script.lock().unwrap())(index, data);
        if !notifications.is_empty() {
            let slot = self.slot.clone();
            tokio::spawn(async move {
                for raw in notifications {
                    slot.dispatch(raw);
                }
            });
        }
        tokio::task::yield_now().await;
        Ok(())
    }

    fn on_notification(&self) -> NotificationListener {
        self.slot.register()
    }

    fn discard_backlog(&self) {
        self.slot.discard_backlog();
    }

    async fn close(&self) -> Result<()> {
        self.slot.clear();
        Ok(())
    }
}
