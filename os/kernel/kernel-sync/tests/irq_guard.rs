//! The emulated interrupt flag is process-global, so everything that observes
//! it lives in this single test.

use kernel_sync::irq::{IrqGuard, interrupts_enabled};
use kernel_sync::{SpinMutex, SyncOnceCell};

#[test]
fn irq_masking_restores_previous_state() {
    assert!(interrupts_enabled(), "hosted flag starts enabled");

    let m = SpinMutex::new(0u32);
    {
        let mut g = m.lock_irq();
        *g += 1;
        assert!(!interrupts_enabled(), "lock_irq masks interrupts");
        assert!(m.try_lock().is_none(), "mutex held under lock_irq");
    }
    assert!(interrupts_enabled(), "guard drop restores IF");
    assert_eq!(m.with_lock(|v| *v), 1);

    // Nested guards only re-enable on the outermost drop.
    {
        let _outer = IrqGuard::new();
        {
            let _inner = IrqGuard::new();
            assert!(!interrupts_enabled());
        }
        assert!(!interrupts_enabled(), "inner guard saw IF=0 and keeps it");
    }
    assert!(interrupts_enabled());

    let v = m.with_lock_irq(|v| {
        *v += 1;
        interrupts_enabled()
    });
    assert!(!v);
    assert!(interrupts_enabled());

    let cell = SyncOnceCell::new();
    assert_eq!(cell.try_init(5u8), Ok(&5));
    assert_eq!(cell.try_init(6u8), Err(6));
    assert_eq!(cell.get(), Some(&5));
}
