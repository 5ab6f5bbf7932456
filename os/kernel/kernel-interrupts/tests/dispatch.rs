use kernel_interrupts::{
    FnHandler, InterruptContext, InterruptController, InterruptError, InterruptFrame,
    InterruptHandler, Interrupts, VectorFlags, HANDLERS_PER_VECTOR,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

struct FakeController {
    apic_id: AtomicU32,
    eois: Mutex<Vec<u8>>,
}

impl FakeController {
    const fn new(apic_id: u32) -> Self {
        Self {
            apic_id: AtomicU32::new(apic_id),
            eois: Mutex::new(Vec::new()),
        }
    }
}

impl InterruptController for FakeController {
    fn current_apic_id(&self) -> u32 {
        self.apic_id.load(Ordering::SeqCst)
    }

    fn end_of_interrupt(&self, vector: u8) {
        self.eois.lock().unwrap().push(vector);
    }
}

fn frame(vector: u8) -> InterruptFrame {
    InterruptFrame {
        vector: u64::from(vector),
        rip: 0xFFFF_FFFF_8000_1000,
        cs: 0x08,
        ..InterruptFrame::default()
    }
}

const STUBS: [u64; 256] = [0x1000; 256];

/// Records its position in the run order.
struct Ordered {
    id: usize,
    log: &'static Mutex<Vec<usize>>,
}

impl InterruptHandler for Ordered {
    fn handle(&self, ctx: &mut InterruptContext<'_>) {
        self.log.lock().unwrap().push(self.id);
        let mut regs = ctx.register_state();
        regs.rax += 1;
        ctx.set_register_state(regs);
    }
}

#[test]
fn sixteen_handlers_run_in_slot_order() {
    static IRQS: Interrupts<2> = Interrupts::new();
    static CTRL: FakeController = FakeController::new(5);
    static LOG: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    IRQS.install_controller(&CTRL);
    assert_eq!(unsafe { IRQS.init_core(3, &STUBS, 0x08) }, Ok(0));
    assert_eq!(unsafe { IRQS.init_core(5, &STUBS, 0x08) }, Ok(1));

    let vector = IRQS.allocate_vectors(1, VectorFlags::EXCLUSIVE, 0).unwrap();
    assert_eq!(vector, 32);
    for id in 0..HANDLERS_PER_VECTOR {
        let h: &'static Ordered = Box::leak(Box::new(Ordered { id, log: &LOG }));
        IRQS.register_handler(vector, h).unwrap();
    }
    static EXTRA: FnHandler = FnHandler(|_| {});
    assert_eq!(
        IRQS.register_handler(vector, &EXTRA),
        Err(InterruptError::VectorOversubscribed { vector })
    );

    let mut f = frame(vector);
    IRQS.dispatch(&mut f);

    assert_eq!(*LOG.lock().unwrap(), (0..HANDLERS_PER_VECTOR).collect::<Vec<_>>());
    assert_eq!(f.rax, HANDLERS_PER_VECTOR as u64, "edits reach the saved frame");
    assert_eq!(*CTRL.eois.lock().unwrap(), vec![vector]);
    assert_eq!(unsafe { IRQS.last_snapshot(1) }.unwrap().vector, u64::from(vector));
}

#[test]
fn state_is_only_reachable_during_dispatch() {
    static IRQS: Interrupts<1> = Interrupts::new();
    static SEEN: AtomicUsize = AtomicUsize::new(0);

    fn peek(ctx: &mut InterruptContext<'_>) {
        let core = ctx.core_index();
        let regs = IRQS.register_state(core).unwrap();
        assert_eq!(regs.rip, 0xFFFF_FFFF_8000_1000);

        let mut moved = regs;
        moved.rip += 2;
        IRQS.set_register_state(core, moved).unwrap();
        assert_eq!(ctx.register_state().rip, moved.rip);
        SEEN.fetch_add(1, Ordering::SeqCst);
    }
    static PEEK: FnHandler = FnHandler(peek);

    assert_eq!(IRQS.register_state(0), Err(InterruptError::NotInInterrupt));
    assert_eq!(IRQS.register_state(7), Err(InterruptError::NoSuchCore { core: 7 }));

    IRQS.register_handler(3, &PEEK).unwrap();
    let mut f = frame(3);
    IRQS.dispatch(&mut f);

    assert_eq!(SEEN.load(Ordering::SeqCst), 1);
    assert_eq!(f.rip, 0xFFFF_FFFF_8000_1002);
    assert_eq!(IRQS.register_state(0), Err(InterruptError::NotInInterrupt));
}

#[test]
fn exceptions_are_not_acknowledged() {
    static IRQS: Interrupts<1> = Interrupts::new();
    static CTRL: FakeController = FakeController::new(0);
    static NOP: FnHandler = FnHandler(|_| {});

    IRQS.install_controller(&CTRL);
    unsafe { IRQS.init_core(0, &STUBS, 0x08) }.unwrap();
    IRQS.register_handler(14, &NOP).unwrap();
    IRQS.register_handler(0xFF, &NOP).unwrap();

    IRQS.dispatch(&mut frame(14));
    IRQS.dispatch(&mut frame(0xFF));
    assert_eq!(*CTRL.eois.lock().unwrap(), vec![0xFF]);
}

#[test]
fn handlers_may_unregister_themselves() {
    static IRQS: Interrupts<1> = Interrupts::new();
    static RUNS: AtomicUsize = AtomicUsize::new(0);

    struct OneShot(u8);
    impl InterruptHandler for OneShot {
        fn handle(&self, ctx: &mut InterruptContext<'_>) {
            RUNS.fetch_add(1, Ordering::SeqCst);
            IRQS.unregister_handler(ctx.vector(), &ONE_SHOT);
        }
    }
    static ONE_SHOT: OneShot = OneShot(0);
    static FALLBACK: FnHandler = FnHandler(|_| {});

    IRQS.register_handler(0x50, &ONE_SHOT).unwrap();
    IRQS.register_handler(0x50, &FALLBACK).unwrap();

    IRQS.dispatch(&mut frame(0x50));
    IRQS.dispatch(&mut frame(0x50));
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    assert_eq!(IRQS.handler_count(0x50), 1);
}

#[test]
#[should_panic(expected = "[core 0] unhandled interrupt 0x41")]
fn unhandled_interrupt_is_fatal() {
    static IRQS: Interrupts<1> = Interrupts::new();
    IRQS.dispatch(&mut frame(0x41));
}

#[test]
fn core_table_overflow_is_reported() {
    static IRQS: Interrupts<1> = Interrupts::new();
    assert_eq!(unsafe { IRQS.init_core(1, &STUBS, 0x08) }, Ok(0));
    assert_eq!(
        unsafe { IRQS.init_core(2, &STUBS, 0x08) },
        Err(InterruptError::CoreTableFull { apic_id: 2 })
    );
    let idt = unsafe { IRQS.cores().slot(0).unwrap().idt() };
    assert_eq!(idt[0x20].handler_addr(), 0x1000);
}
